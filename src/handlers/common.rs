use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Header carrying the authenticated profile id, injected by the upstream
/// gateway after session resolution. Authentication itself lives outside
/// this service.
pub const PROFILE_ID_HEADER: &str = "x-profile-id";

/// Extractor for the caller's tenant identity.
#[derive(Debug, Clone, Copy)]
pub struct CurrentProfile(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentProfile
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(PROFILE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing profile identity".into()))?;

        let profile_id = Uuid::parse_str(raw)
            .map_err(|_| ServiceError::Unauthorized("Malformed profile identity".into()))?;

        Ok(CurrentProfile(profile_id))
    }
}
