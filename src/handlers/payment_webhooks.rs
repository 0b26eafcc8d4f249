use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use tracing::{info, warn};

use crate::clients::payments::{self, PaymentEvent};
use crate::errors::ServiceError;
use crate::AppState;

// POST /api/v1/payments/webhook
//
// Safe to re-invoke: the reconciler's event ledger and status-guarded
// transitions absorb redelivery. Returning an error here asks the processor
// to redeliver later.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Authenticity first, before any parsing side effect
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let ok = payments::verify_webhook_signature(
            &headers,
            &body,
            secret,
            state.config.payment_webhook_tolerance_secs,
        );
        if !ok {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    } else {
        warn!("Payment webhook secret not configured; accepting unsigned event");
    }

    let event = payments::parse_webhook_event(&body)?;

    if let PaymentEvent::Unhandled { event_type } = &event.kind {
        info!(event_type, event_id = %event.id, "Acknowledging unhandled payment webhook type");
    }

    state.services.reconciler.process(&event).await?;

    Ok((StatusCode::OK, "ok"))
}
