use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{retry_idempotent, RetryPolicy};
use crate::config::AppConfig;
use crate::entities::domain_order::RegistrantContact;
use crate::errors::ServiceError;

/// Availability + pricing snapshot for one candidate domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainQuote {
    pub purchase_price: Decimal,
    pub renewal_price: Decimal,
    pub term_years: i32,
}

/// Result of a registrar-side purchase + hosting attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDomain {
    pub domain: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// DNS / attachment verification state as reported by the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Verified,
    Pending,
    Misconfigured,
}

/// Registrar-side purchase request. The idempotency key is derived from the
/// order id so a webhook redelivery may safely re-run provisioning.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseRequest {
    pub order_id: Uuid,
    pub domain: String,
    pub contact: RegistrantContact,
    pub expected_price: Decimal,
    pub term_years: i32,
}

impl PurchaseRequest {
    pub fn idempotency_key(&self) -> String {
        format!("order-{}", self.order_id)
    }
}

/// Port over the registrar / hosting platform API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrarApi: Send + Sync {
    async fn check_availability(&self, domain: &str) -> Result<bool, ServiceError>;

    async fn get_price(&self, domain: &str) -> Result<DomainQuote, ServiceError>;

    /// Executes the registrar-side purchase and attaches the domain to the
    /// hosting project. Not retried internally; callers may re-invoke with
    /// the same order id thanks to the idempotency key.
    async fn purchase_and_attach(
        &self,
        request: &PurchaseRequest,
    ) -> Result<AttachedDomain, ServiceError>;

    async fn detach(&self, domain: &str) -> Result<(), ServiceError>;

    async fn verify_status(&self, domain: &str) -> Result<VerificationState, ServiceError>;
}

/// HTTP adapter for the registrar / hosting platform.
pub struct HttpRegistrarClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    project_id: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct AvailabilityBody {
    available: bool,
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    purchase_price: Decimal,
    renewal_price: Decimal,
    #[serde(default = "default_term_years")]
    term_years: i32,
}

fn default_term_years() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
struct PurchaseBody {
    domain: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    state: VerificationState,
}

#[derive(Debug, Deserialize)]
struct RegistrarErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl HttpRegistrarClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.external_timeout_secs))
            .build()
            .map_err(|e| ServiceError::RegistrarUnavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.registrar_api_base.trim_end_matches('/').to_string(),
            token: cfg.registrar_api_token.clone(),
            project_id: cfg.registrar_project_id.clone(),
            retry: RetryPolicy::with_retries(cfg.external_retry_budget),
        })
    }

    /// Constructor for tests pointing at a mock server.
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        project_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            project_id: project_id.into(),
            retry,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ServiceError::RegistrarUnavailable(format!("invalid body: {e}")));
        }

        let message = response
            .json::<RegistrarErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("registrar returned {status}"));

        if status.is_server_error() || status.as_u16() == 429 {
            Err(ServiceError::RegistrarUnavailable(message))
        } else {
            Err(ServiceError::BadRequest(message))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ServiceError::RegistrarUnavailable(e.to_string()))?;
        Self::decode(response).await
    }
}

#[async_trait]
impl RegistrarApi for HttpRegistrarClient {
    #[instrument(skip(self))]
    async fn check_availability(&self, domain: &str) -> Result<bool, ServiceError> {
        let path = format!("/v1/domains/{domain}/availability");
        let body: AvailabilityBody =
            retry_idempotent("registrar.availability", self.retry, || {
                self.get_json(&path)
            })
            .await?;
        Ok(body.available)
    }

    #[instrument(skip(self))]
    async fn get_price(&self, domain: &str) -> Result<DomainQuote, ServiceError> {
        let path = format!("/v1/domains/{domain}/price");
        let body: PriceBody =
            retry_idempotent("registrar.price", self.retry, || self.get_json(&path)).await?;
        Ok(DomainQuote {
            purchase_price: body.purchase_price,
            renewal_price: body.renewal_price,
            term_years: body.term_years,
        })
    }

    #[instrument(skip(self, request), fields(domain = %request.domain, order_id = %request.order_id))]
    async fn purchase_and_attach(
        &self,
        request: &PurchaseRequest,
    ) -> Result<AttachedDomain, ServiceError> {
        let path = format!("/v1/projects/{}/domains", self.project_id);
        let response = self
            .http
            .post(self.url(&path))
            .bearer_auth(&self.token)
            .header("Idempotency-Key", request.idempotency_key())
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::RegistrarUnavailable(e.to_string()))?;

        let body: PurchaseBody = Self::decode(response).await?;
        Ok(AttachedDomain {
            domain: body.domain,
            expires_at: body.expires_at,
        })
    }

    #[instrument(skip(self))]
    async fn detach(&self, domain: &str) -> Result<(), ServiceError> {
        let path = format!("/v1/projects/{}/domains/{domain}", self.project_id);
        let response = self
            .http
            .delete(self.url(&path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ServiceError::RegistrarUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            warn!(domain, %status, "Registrar detach returned an error");
            Err(ServiceError::RegistrarUnavailable(format!(
                "detach returned {status}"
            )))
        }
    }

    #[instrument(skip(self))]
    async fn verify_status(&self, domain: &str) -> Result<VerificationState, ServiceError> {
        let path = format!(
            "/v1/projects/{}/domains/{domain}/verify",
            self.project_id
        );
        let body: VerifyBody =
            retry_idempotent("registrar.verify", self.retry, || self.get_json(&path)).await?;
        Ok(body.state)
    }
}
