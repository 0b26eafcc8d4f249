use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::CurrentProfile;
use crate::services::orders::{
    CheckoutRedirect, CreateDomainOrderRequest, DomainOrderResponse, DomainVerification,
};
use crate::services::search::DomainCandidate;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Bare label (expanded across candidate TLDs) or full domain name
    pub query: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<DomainCandidate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DismissResponse {
    pub dismissed: bool,
}

// GET /api/v1/domains/search
#[utoipa::path(
    get,
    path = "/api/v1/domains/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Candidate domains with availability and pricing"),
        (status = 403, description = "Profile is not on a paid tier", body = crate::errors::ErrorResponse)
    ),
    tag = "Domains"
)]
pub async fn search_domains(
    State(state): State<AppState>,
    CurrentProfile(profile_id): CurrentProfile,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let profile = state
        .services
        .store
        .get_profile(profile_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Profile not found".into()))?;

    if !profile.is_paid_tier() {
        return Err(ServiceError::Forbidden(
            "Custom domains require a paid subscription".into(),
        ));
    }

    let results = state.services.search.search(&params.query).await?;
    Ok(Json(ApiResponse::success(SearchResponse { results })))
}

// POST /api/v1/domains/checkout
#[utoipa::path(
    post,
    path = "/api/v1/domains/checkout",
    request_body = CreateDomainOrderRequest,
    responses(
        (status = 200, description = "Checkout opened; redirect the user"),
        (status = 402, description = "Payment processor rejected the request", body = crate::errors::ErrorResponse),
        (status = 409, description = "An order is already in progress", body = crate::errors::ErrorResponse)
    ),
    tag = "Domains"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    CurrentProfile(profile_id): CurrentProfile,
    Json(request): Json<CreateDomainOrderRequest>,
) -> ApiResult<CheckoutRedirect> {
    let redirect = state
        .services
        .orders
        .create_checkout(profile_id, request)
        .await?;
    Ok(Json(ApiResponse::success(redirect)))
}

// GET /api/v1/domains/order
#[utoipa::path(
    get,
    path = "/api/v1/domains/order",
    responses(
        (status = 200, description = "The caller's current order, or null")
    ),
    tag = "Domains"
)]
pub async fn get_current_order(
    State(state): State<AppState>,
    CurrentProfile(profile_id): CurrentProfile,
) -> ApiResult<Option<DomainOrderResponse>> {
    let order = state.services.orders.get_current_order(profile_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

// POST /api/v1/domains/cancel
#[utoipa::path(
    post,
    path = "/api/v1/domains/cancel",
    responses(
        (status = 200, description = "Order cancelled; domain released"),
        (status = 404, description = "No active order", body = crate::errors::ErrorResponse)
    ),
    tag = "Domains"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentProfile(profile_id): CurrentProfile,
) -> ApiResult<CancelResponse> {
    state.services.orders.cancel(profile_id).await?;
    Ok(Json(ApiResponse::success(CancelResponse { success: true })))
}

// POST /api/v1/domains/orders/:id/dismiss
#[utoipa::path(
    post,
    path = "/api/v1/domains/orders/{id}/dismiss",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Failed order dismissed from the active view"),
        (status = 404, description = "No failed order with this id", body = crate::errors::ErrorResponse)
    ),
    tag = "Domains"
)]
pub async fn dismiss_order(
    State(state): State<AppState>,
    CurrentProfile(profile_id): CurrentProfile,
    Path(order_id): Path<Uuid>,
) -> ApiResult<DismissResponse> {
    state.services.orders.dismiss(profile_id, order_id).await?;
    Ok(Json(ApiResponse::success(DismissResponse {
        dismissed: true,
    })))
}

// GET /api/v1/domains/verify
#[utoipa::path(
    get,
    path = "/api/v1/domains/verify",
    responses(
        (status = 200, description = "DNS / attachment verification state"),
        (status = 404, description = "No attached domain", body = crate::errors::ErrorResponse)
    ),
    tag = "Domains"
)]
pub async fn verify_domain(
    State(state): State<AppState>,
    CurrentProfile(profile_id): CurrentProfile,
) -> ApiResult<DomainVerification> {
    let verification = state.services.orders.verify(profile_id).await?;
    Ok(Json(ApiResponse::success(verification)))
}
