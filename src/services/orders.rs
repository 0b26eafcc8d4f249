use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::clients::payments::{CheckoutSessionRequest, PaymentGateway};
use crate::clients::registrar::{RegistrarApi, VerificationState};
use crate::config::AppConfig;
use crate::entities::domain_order::{self, DomainOrderStatus, RegistrantContact};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::order_store::OrderStore;
use crate::services::validate_domain_name;

/// Checkout-related knobs snapshotted from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub service_fee: Decimal,
    pub currency: String,
    pub term_years: i32,
    pub app_base_url: String,
}

impl CheckoutSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            service_fee: cfg.domain_service_fee,
            currency: cfg.currency.clone(),
            term_years: cfg.domain_term_years,
            app_base_url: cfg.app_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateDomainOrderRequest {
    #[validate(length(min = 4, max = 253))]
    pub domain: String,
    #[validate]
    pub contact: RegistrantContact,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DomainOrderResponse {
    pub id: Uuid,
    pub domain: String,
    pub status: DomainOrderStatus,
    pub registrar_purchase_price: Decimal,
    pub registrar_renewal_price: Decimal,
    pub service_fee: Decimal,
    pub first_year_total: Decimal,
    pub renewal_total: Decimal,
    pub term_years: i32,
    /// Usable-until marker shown during renewal-failure grace periods
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutRedirect {
    pub order_id: Uuid,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DomainVerification {
    pub domain: String,
    pub state: VerificationState,
}

/// User-facing orchestration: order creation + checkout, cancellation, and
/// the synchronous read paths. Asynchronous transitions belong to the
/// webhook reconciler.
#[derive(Clone)]
pub struct DomainOrderService {
    store: OrderStore,
    registrar: Arc<dyn RegistrarApi>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
    settings: CheckoutSettings,
}

impl DomainOrderService {
    pub fn new(
        store: OrderStore,
        registrar: Arc<dyn RegistrarApi>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            registrar,
            gateway,
            event_sender,
            settings,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to emit domain lifecycle event");
            }
        }
    }

    /// Creates a new order and opens a recurring checkout for it.
    ///
    /// The registrar price is re-fetched here (it may have moved since
    /// search) and snapshotted onto the order; the order row is the price
    /// contract from then on. Any external failure aborts before a row is
    /// written.
    #[instrument(skip(self, request), fields(profile_id = %profile_id, domain = %request.domain))]
    pub async fn create_checkout(
        &self,
        profile_id: Uuid,
        request: CreateDomainOrderRequest,
    ) -> Result<CheckoutRedirect, ServiceError> {
        request.validate()?;
        let domain = request.domain.trim().to_ascii_lowercase();
        validate_domain_name(&domain)?;

        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Profile not found".into()))?;

        if !profile.is_paid_tier() {
            return Err(ServiceError::Forbidden(
                "Custom domains require a paid subscription".into(),
            ));
        }

        if self.store.count_alive_orders(profile_id).await? > 0 {
            return Err(ServiceError::Conflict(
                "A domain order is already in progress for this profile".into(),
            ));
        }

        let quote = self.registrar.get_price(&domain).await?;

        let customer_id = self
            .gateway
            .ensure_customer(profile_id, &request.contact.email)
            .await?;

        let order_id = Uuid::new_v4();
        let first_year_total = quote.purchase_price + self.settings.service_fee;
        let renewal_total = quote.renewal_price + self.settings.service_fee;

        let session = self
            .gateway
            .create_checkout_session(&CheckoutSessionRequest {
                order_id,
                customer_id,
                domain: domain.clone(),
                amount_cents: to_cents(first_year_total)?,
                renewal_amount_cents: to_cents(renewal_total)?,
                currency: self.settings.currency.clone(),
                success_url: format!(
                    "{}/dashboard/domains?checkout=success",
                    self.settings.app_base_url
                ),
                cancel_url: format!(
                    "{}/dashboard/domains?checkout=cancelled",
                    self.settings.app_base_url
                ),
            })
            .await?;

        let now = Utc::now();
        let order = self
            .store
            .insert_order(domain_order::ActiveModel {
                id: Set(order_id),
                profile_id: Set(profile_id),
                domain: Set(domain.clone()),
                status: Set(DomainOrderStatus::PendingPayment.to_string()),
                registrar_purchase_price: Set(quote.purchase_price),
                registrar_renewal_price: Set(quote.renewal_price),
                service_fee: Set(self.settings.service_fee),
                term_years: Set(quote.term_years.max(self.settings.term_years)),
                contact_info: Set(serde_json::to_string(&request.contact)?),
                payment_checkout_session_id: Set(Some(session.id.clone())),
                payment_subscription_id: Set(None),
                expires_at: Set(None),
                is_dismissed: Set(false),
                created_at: Set(now),
                updated_at: Set(Some(now)),
                version: Set(1),
            })
            .await?;

        self.emit(Event::OrderCreated {
            order_id: order.id,
            profile_id,
            domain,
        })
        .await;

        Ok(CheckoutRedirect {
            order_id: order.id,
            checkout_url: session.url,
        })
    }

    /// Returns the order the dashboard should surface: the alive one, or a
    /// failed one the user has not dismissed yet.
    pub async fn get_current_order(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<DomainOrderResponse>, ServiceError> {
        match self.store.find_current_order(profile_id).await? {
            Some(order) => Ok(Some(model_to_response(order)?)),
            None => Ok(None),
        }
    }

    /// Cancels the active (or renewal-failed) order.
    ///
    /// External teardown steps are attempted first but never block the local
    /// `cancelled` transition; their failures are logged and emitted for
    /// manual reconciliation.
    #[instrument(skip(self), fields(profile_id = %profile_id))]
    pub async fn cancel(&self, profile_id: Uuid) -> Result<(), ServiceError> {
        let order = self
            .store
            .find_linked_order(profile_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active domain order to cancel".into()))?;

        if let Some(subscription_id) = order.payment_subscription_id.as_deref() {
            if let Err(e) = self.gateway.cancel_subscription(subscription_id).await {
                warn!(order_id = %order.id, error = %e, "Subscription cancel failed during teardown");
                self.emit(Event::TeardownStepFailed {
                    order_id: order.id,
                    step: "cancel_subscription".into(),
                    reason: e.to_string(),
                })
                .await;
            }
        }

        if let Err(e) = self.registrar.detach(&order.domain).await {
            warn!(order_id = %order.id, error = %e, "Domain detach failed during teardown");
            self.emit(Event::TeardownStepFailed {
                order_id: order.id,
                step: "detach_domain".into(),
                reason: e.to_string(),
            })
            .await;
        }

        self.store
            .transition(
                order.id,
                &[DomainOrderStatus::Active, DomainOrderStatus::RenewalFailed],
                DomainOrderStatus::Cancelled,
                |update| update,
            )
            .await?;

        self.store.set_profile_domain(profile_id, None).await?;

        self.emit(Event::OrderCancelled {
            order_id: order.id,
            domain: order.domain,
        })
        .await;

        Ok(())
    }

    /// Clears a failed order from the user's active view. Purely local; the
    /// row stays for audit.
    pub async fn dismiss(&self, profile_id: Uuid, order_id: Uuid) -> Result<(), ServiceError> {
        if self.store.dismiss_failed_order(profile_id, order_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound(
                "No failed order to dismiss".into(),
            ))
        }
    }

    /// Surfaces registrar-side DNS / attachment verification for the current
    /// linked domain.
    pub async fn verify(&self, profile_id: Uuid) -> Result<DomainVerification, ServiceError> {
        let order = self
            .store
            .find_linked_order(profile_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No attached domain to verify".into()))?;
        let state = self.registrar.verify_status(&order.domain).await?;
        Ok(DomainVerification {
            domain: order.domain,
            state,
        })
    }
}

pub(crate) fn model_to_response(
    model: domain_order::Model,
) -> Result<DomainOrderResponse, ServiceError> {
    let status = model.status()?;
    Ok(DomainOrderResponse {
        id: model.id,
        status,
        first_year_total: model.first_year_total(),
        renewal_total: model.renewal_total(),
        domain: model.domain,
        registrar_purchase_price: model.registrar_purchase_price,
        registrar_renewal_price: model.registrar_renewal_price,
        service_fee: model.service_fee,
        term_years: model.term_years,
        expires_at: model.expires_at,
        created_at: model.created_at,
    })
}

fn to_cents(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * dec!(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount out of range: {amount}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::payments::{CheckoutSession, MockPaymentGateway};
    use crate::clients::registrar::{DomainQuote, MockRegistrarApi};
    use crate::entities::profile;
    use sea_orm::ActiveModelTrait;

    async fn store() -> OrderStore {
        let db = crate::db::connect_in_memory()
            .await
            .expect("sqlite connection");
        crate::db::run_migrations(&db).await.expect("migrations");
        OrderStore::new(Arc::new(db))
    }

    async fn seed_profile(store: &OrderStore, tier: &str) -> Uuid {
        let id = Uuid::new_v4();
        profile::ActiveModel {
            id: Set(id),
            tier: Set(tier.into()),
            custom_domain: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(store.connection())
        .await
        .expect("profile");
        id
    }

    fn settings() -> CheckoutSettings {
        CheckoutSettings {
            service_fee: dec!(12.00),
            currency: "usd".into(),
            term_years: 1,
            app_base_url: "http://localhost:3000".into(),
        }
    }

    fn contact() -> RegistrantContact {
        RegistrantContact {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+14155550101".into(),
            address_line1: "1 Analytical Way".into(),
            address_line2: None,
            city: "London".into(),
            state: "LDN".into(),
            postal_code: "EC1A".into(),
            country_code: "GB".into(),
        }
    }

    fn request(domain: &str) -> CreateDomainOrderRequest {
        CreateDomainOrderRequest {
            domain: domain.into(),
            contact: contact(),
        }
    }

    fn quote() -> DomainQuote {
        DomainQuote {
            purchase_price: dec!(34.00),
            renewal_price: dec!(30.00),
            term_years: 1,
        }
    }

    fn service(
        store: OrderStore,
        registrar: MockRegistrarApi,
        gateway: MockPaymentGateway,
    ) -> DomainOrderService {
        DomainOrderService::new(
            store,
            Arc::new(registrar),
            Arc::new(gateway),
            None,
            settings(),
        )
    }

    #[tokio::test]
    async fn free_tier_cannot_create_orders() {
        let store = store().await;
        let profile_id = seed_profile(&store, "free").await;

        let svc = service(store, MockRegistrarApi::new(), MockPaymentGateway::new());
        let err = svc
            .create_checkout(profile_id, request("mydomain.dj"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn checkout_charges_snapshotted_price_plus_fee() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;

        let mut registrar = MockRegistrarApi::new();
        registrar.expect_get_price().returning(|_| Ok(quote()));

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_ensure_customer()
            .returning(|_, _| Ok("cus_1".into()));
        gateway
            .expect_create_checkout_session()
            // 34.00 + 12.00 = 46.00 first year; 30.00 + 12.00 = 42.00 renewal
            .withf(|req| req.amount_cents == 4600 && req.renewal_amount_cents == 4200)
            .returning(|_| {
                Ok(CheckoutSession {
                    id: "cs_1".into(),
                    url: "https://pay.example/cs_1".into(),
                })
            });

        let svc = service(store.clone(), registrar, gateway);
        let redirect = svc
            .create_checkout(profile_id, request("MyDomain.DJ"))
            .await
            .unwrap();
        assert_eq!(redirect.checkout_url, "https://pay.example/cs_1");

        let order = store.get_order(redirect.order_id).await.unwrap().unwrap();
        assert_eq!(order.status().unwrap(), DomainOrderStatus::PendingPayment);
        assert_eq!(order.domain, "mydomain.dj");
        assert_eq!(order.registrar_purchase_price, dec!(34.00));
        assert_eq!(order.registrar_renewal_price, dec!(30.00));
        assert_eq!(order.service_fee, dec!(12.00));
        assert_eq!(order.payment_checkout_session_id.as_deref(), Some("cs_1"));
    }

    #[tokio::test]
    async fn second_alive_order_is_a_conflict() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;

        let mut registrar = MockRegistrarApi::new();
        registrar.expect_get_price().returning(|_| Ok(quote()));
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_ensure_customer()
            .returning(|_, _| Ok("cus_1".into()));
        gateway.expect_create_checkout_session().returning(|_| {
            Ok(CheckoutSession {
                id: "cs_1".into(),
                url: "https://pay.example/cs_1".into(),
            })
        });

        let svc = service(store, registrar, gateway);
        svc.create_checkout(profile_id, request("mydomain.dj"))
            .await
            .unwrap();

        let err = svc
            .create_checkout(profile_id, request("otherdomain.dj"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn price_fetch_failure_leaves_no_partial_state() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;

        let mut registrar = MockRegistrarApi::new();
        registrar
            .expect_get_price()
            .returning(|_| Err(ServiceError::RegistrarUnavailable("down".into())));
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_ensure_customer().never();
        gateway.expect_create_checkout_session().never();

        let svc = service(store.clone(), registrar, gateway);
        let err = svc
            .create_checkout(profile_id, request("mydomain.dj"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RegistrarUnavailable(_)));
        assert_eq!(store.count_alive_orders(profile_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_without_linked_order_is_not_found() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;

        let svc = service(store, MockRegistrarApi::new(), MockPaymentGateway::new());
        let err = svc.cancel(profile_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
