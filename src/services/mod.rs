pub mod order_store;
pub mod orders;
pub mod reconciler;
pub mod search;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ServiceError;

static DOMAIN_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)+$")
        .expect("domain name regex")
});

static DOMAIN_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("domain label regex"));

/// Validates a fully-qualified domain name (lowercased by the caller).
pub(crate) fn validate_domain_name(domain: &str) -> Result<(), ServiceError> {
    if domain.len() > 253 || !DOMAIN_NAME_RE.is_match(domain) {
        return Err(ServiceError::ValidationError(format!(
            "'{domain}' is not a valid domain name"
        )));
    }
    Ok(())
}

/// Validates a bare search label (no TLD).
pub(crate) fn validate_domain_label(label: &str) -> Result<(), ServiceError> {
    if !DOMAIN_LABEL_RE.is_match(label) {
        return Err(ServiceError::ValidationError(format!(
            "'{label}' is not a valid domain label"
        )));
    }
    Ok(())
}
