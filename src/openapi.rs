use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mixsite Domains API",
        description = "Custom-domain search, checkout, provisioning, and lifecycle management for published Mixsite artist pages"
    ),
    paths(
        crate::handlers::domains::search_domains,
        crate::handlers::domains::create_checkout,
        crate::handlers::domains::get_current_order,
        crate::handlers::domains::cancel_order,
        crate::handlers::domains::dismiss_order,
        crate::handlers::domains::verify_domain,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::health::health,
        crate::handlers::health::readiness,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::domain_order::DomainOrderStatus,
        crate::entities::domain_order::RegistrantContact,
        crate::clients::registrar::VerificationState,
        crate::services::orders::CreateDomainOrderRequest,
        crate::services::orders::DomainOrderResponse,
        crate::services::orders::CheckoutRedirect,
        crate::services::orders::DomainVerification,
        crate::services::search::DomainCandidate,
        crate::handlers::domains::SearchResponse,
        crate::handlers::domains::CancelResponse,
        crate::handlers::domains::DismissResponse,
    )),
    tags(
        (name = "Domains", description = "Domain search, checkout, and lifecycle"),
        (name = "Payments", description = "Payment processor webhook ingress"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
