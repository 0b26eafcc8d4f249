//! Mixsite Domains API Library
//!
//! Custom-domain provisioning and lifecycle orchestration for published
//! artist pages: search, checkout, webhook-driven provisioning, renewal
//! tracking, and cancellation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::clients::payments::PaymentGateway;
use crate::clients::registrar::RegistrarApi;
use crate::events::EventSender;
use crate::services::order_store::OrderStore;
use crate::services::orders::{CheckoutSettings, DomainOrderService};
use crate::services::reconciler::WebhookReconciler;
use crate::services::search::DomainSearchService;

/// Service handles shared by the request handlers.
#[derive(Clone)]
pub struct AppServices {
    pub store: OrderStore,
    pub orders: Arc<DomainOrderService>,
    pub search: Arc<DomainSearchService>,
    pub reconciler: Arc<WebhookReconciler>,
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    /// Wires the service graph over the given ports. The adapters are
    /// injected so tests can run the whole state machine against
    /// deterministic fakes.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: EventSender,
        registrar: Arc<dyn RegistrarApi>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let store = OrderStore::new(db.clone());
        let sender = Arc::new(event_sender.clone());

        let search = Arc::new(DomainSearchService::new(
            registrar.clone(),
            Duration::from_secs(config.search_timeout_secs),
        ));
        let orders = Arc::new(DomainOrderService::new(
            store.clone(),
            registrar.clone(),
            gateway.clone(),
            Some(sender.clone()),
            CheckoutSettings::from_config(&config),
        ));
        let reconciler = Arc::new(WebhookReconciler::new(
            store.clone(),
            registrar,
            gateway,
            Some(sender),
        ));

        Self {
            db,
            config,
            event_sender,
            services: AppServices {
                store,
                orders,
                search,
                reconciler,
            },
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// API routes under /api/v1
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/domains/search", get(handlers::domains::search_domains))
        .route("/domains/checkout", post(handlers::domains::create_checkout))
        .route("/domains/order", get(handlers::domains::get_current_order))
        .route("/domains/cancel", post(handlers::domains::cancel_order))
        .route(
            "/domains/orders/:id/dismiss",
            post(handlers::domains::dismiss_order),
        )
        .route("/domains/verify", get(handlers::domains::verify_domain))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
}

/// Builds the full application router: status + health + v1 API + docs,
/// wrapped in the tracing / compression / timeout / request-id layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "mixsite-domains up" }))
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::readiness))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http().make_span_with(tracing::RequestSpanMaker))
        .layer(CompressionLayer::new())
        // The dashboard lives on a different origin; auth happens upstream
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(axum::middleware::from_fn(tracing::request_id_middleware))
        .with_state(state)
}
