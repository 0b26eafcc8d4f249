use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::clients::registrar::RegistrarApi;
use crate::errors::ServiceError;
use crate::services::{validate_domain_label, validate_domain_name};

/// The fixed candidate TLD set a bare search label expands across.
pub const CANDIDATE_TLDS: [&str; 6] = ["com", "io", "dj", "music", "live", "events"];

/// One search result candidate. Unavailable candidates carry no prices:
/// pricing calls are skipped for them to bound latency and cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DomainCandidate {
    pub domain: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_years: Option<i32>,
}

/// Availability + pricing search across candidate domains. Tenant
/// eligibility (paid tier) is enforced by the caller.
#[derive(Clone)]
pub struct DomainSearchService {
    registrar: Arc<dyn RegistrarApi>,
    candidate_timeout: Duration,
}

impl DomainSearchService {
    pub fn new(registrar: Arc<dyn RegistrarApi>, candidate_timeout: Duration) -> Self {
        Self {
            registrar,
            candidate_timeout,
        }
    }

    /// Expands the query into candidate domains and checks each concurrently.
    /// A candidate whose availability or price call fails or times out is
    /// dropped from the result set; the search itself still succeeds.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<DomainCandidate>, ServiceError> {
        let candidates = expand_candidates(query)?;

        let lookups = candidates.iter().map(|domain| {
            let domain = domain.clone();
            async move {
                match tokio::time::timeout(self.candidate_timeout, self.lookup(&domain)).await {
                    Ok(Ok(candidate)) => Some(candidate),
                    Ok(Err(e)) => {
                        warn!(domain, error = %e, "Dropping candidate after lookup failure");
                        None
                    }
                    Err(_) => {
                        warn!(domain, "Dropping candidate after lookup timeout");
                        None
                    }
                }
            }
        });

        Ok(join_all(lookups).await.into_iter().flatten().collect())
    }

    async fn lookup(&self, domain: &str) -> Result<DomainCandidate, ServiceError> {
        let available = self.registrar.check_availability(domain).await?;
        if !available {
            return Ok(DomainCandidate {
                domain: domain.to_string(),
                available: false,
                purchase_price: None,
                renewal_price: None,
                term_years: None,
            });
        }

        let quote = self.registrar.get_price(domain).await?;
        Ok(DomainCandidate {
            domain: domain.to_string(),
            available: true,
            purchase_price: Some(quote.purchase_price),
            renewal_price: Some(quote.renewal_price),
            term_years: Some(quote.term_years),
        })
    }
}

/// A query carrying a TLD searches exactly that name; a bare label fans out
/// across the candidate TLD set.
fn expand_candidates(query: &str) -> Result<Vec<String>, ServiceError> {
    let normalized = query.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(ServiceError::ValidationError(
            "Search query cannot be empty".into(),
        ));
    }

    if normalized.contains('.') {
        validate_domain_name(&normalized)?;
        Ok(vec![normalized])
    } else {
        validate_domain_label(&normalized)?;
        Ok(CANDIDATE_TLDS
            .iter()
            .map(|tld| format!("{normalized}.{tld}"))
            .collect())
    }
}
