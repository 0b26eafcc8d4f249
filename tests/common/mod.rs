//! Shared test harness: sqlite in-memory database plus deterministic fakes
//! for the registrar and payment processor ports.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use mixsite_domains::clients::payments::{
    CheckoutSession, CheckoutSessionRequest, PaymentEvent, PaymentGateway, ProcessorEvent,
};
use mixsite_domains::clients::registrar::{
    AttachedDomain, DomainQuote, PurchaseRequest, RegistrarApi, VerificationState,
};
use mixsite_domains::entities::domain_order::{DomainOrderStatus, RegistrantContact};
use mixsite_domains::entities::profile;
use mixsite_domains::errors::ServiceError;
use mixsite_domains::services::order_store::OrderStore;
use mixsite_domains::services::orders::{
    CheckoutSettings, CreateDomainOrderRequest, DomainOrderService,
};
use mixsite_domains::services::reconciler::WebhookReconciler;
use mixsite_domains::services::search::DomainSearchService;

/// Registrar fake with switchable failure modes and full call recording.
#[derive(Default)]
pub struct FakeRegistrar {
    pub unavailable: Mutex<HashSet<String>>,
    pub failing: Mutex<HashSet<String>>,
    pub fail_purchase: AtomicBool,
    pub fail_detach: AtomicBool,
    pub purchase_calls: Mutex<Vec<PurchaseRequest>>,
    pub detach_calls: Mutex<Vec<String>>,
    pub verify_state: Mutex<Option<VerificationState>>,
}

impl FakeRegistrar {
    pub fn mark_unavailable(&self, domain: &str) {
        self.unavailable.lock().unwrap().insert(domain.to_string());
    }

    pub fn mark_failing(&self, domain: &str) {
        self.failing.lock().unwrap().insert(domain.to_string());
    }

    pub fn purchase_count(&self) -> usize {
        self.purchase_calls.lock().unwrap().len()
    }

    pub fn detach_count(&self) -> usize {
        self.detach_calls.lock().unwrap().len()
    }
}

pub fn standard_quote() -> DomainQuote {
    DomainQuote {
        purchase_price: dec!(34.00),
        renewal_price: dec!(30.00),
        term_years: 1,
    }
}

pub fn expiry_in_one_year() -> DateTime<Utc> {
    Utc::now() + ChronoDuration::days(365)
}

#[async_trait]
impl RegistrarApi for FakeRegistrar {
    async fn check_availability(&self, domain: &str) -> Result<bool, ServiceError> {
        if self.failing.lock().unwrap().contains(domain) {
            return Err(ServiceError::RegistrarUnavailable("simulated outage".into()));
        }
        Ok(!self.unavailable.lock().unwrap().contains(domain))
    }

    async fn get_price(&self, domain: &str) -> Result<DomainQuote, ServiceError> {
        if self.failing.lock().unwrap().contains(domain) {
            return Err(ServiceError::RegistrarUnavailable("simulated outage".into()));
        }
        Ok(standard_quote())
    }

    async fn purchase_and_attach(
        &self,
        request: &PurchaseRequest,
    ) -> Result<AttachedDomain, ServiceError> {
        self.purchase_calls.lock().unwrap().push(request.clone());
        if self.fail_purchase.load(Ordering::SeqCst) {
            return Err(ServiceError::RegistrarUnavailable(
                "simulated purchase failure".into(),
            ));
        }
        Ok(AttachedDomain {
            domain: request.domain.clone(),
            expires_at: Some(expiry_in_one_year()),
        })
    }

    async fn detach(&self, domain: &str) -> Result<(), ServiceError> {
        self.detach_calls.lock().unwrap().push(domain.to_string());
        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(ServiceError::RegistrarUnavailable(
                "simulated detach failure".into(),
            ));
        }
        Ok(())
    }

    async fn verify_status(&self, _domain: &str) -> Result<VerificationState, ServiceError> {
        Ok(self
            .verify_state
            .lock()
            .unwrap()
            .unwrap_or(VerificationState::Verified))
    }
}

/// Payment gateway fake recording every mutating call.
#[derive(Default)]
pub struct FakeGateway {
    pub fail_refund: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub checkout_requests: Mutex<Vec<CheckoutSessionRequest>>,
    pub refund_calls: Mutex<Vec<String>>,
    pub cancel_calls: Mutex<Vec<String>>,
    session_counter: AtomicU32,
}

impl FakeGateway {
    pub fn refund_count(&self) -> usize {
        self.refund_calls.lock().unwrap().len()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.lock().unwrap().len()
    }

    pub fn last_checkout(&self) -> CheckoutSessionRequest {
        self.checkout_requests
            .lock()
            .unwrap()
            .last()
            .expect("a checkout session was created")
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn ensure_customer(
        &self,
        profile_id: Uuid,
        _email: &str,
    ) -> Result<String, ServiceError> {
        Ok(format!("cus_{}", profile_id.simple()))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        self.checkout_requests.lock().unwrap().push(request.clone());
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{n}");
        Ok(CheckoutSession {
            url: format!("https://pay.example/{id}"),
            id,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ServiceError> {
        self.cancel_calls
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentUnavailable(
                "simulated cancel failure".into(),
            ));
        }
        Ok(())
    }

    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        self.refund_calls
            .lock()
            .unwrap()
            .push(payment_intent_id.to_string());
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentUnavailable(
                "simulated refund failure".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a lifecycle test needs, wired over the fakes.
pub struct TestApp {
    pub store: OrderStore,
    pub registrar: Arc<FakeRegistrar>,
    pub gateway: Arc<FakeGateway>,
    pub orders: DomainOrderService,
    pub search: DomainSearchService,
    pub reconciler: WebhookReconciler,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = mixsite_domains::db::connect_in_memory()
            .await
            .expect("sqlite in-memory connection");
        mixsite_domains::db::run_migrations(&db)
            .await
            .expect("migrations");

        let store = OrderStore::new(Arc::new(db));
        let registrar = Arc::new(FakeRegistrar::default());
        let gateway = Arc::new(FakeGateway::default());

        let settings = CheckoutSettings {
            service_fee: dec!(12.00),
            currency: "usd".into(),
            term_years: 1,
            app_base_url: "http://localhost:3000".into(),
        };

        let orders = DomainOrderService::new(
            store.clone(),
            registrar.clone(),
            gateway.clone(),
            None,
            settings,
        );
        let search = DomainSearchService::new(registrar.clone(), Duration::from_secs(5));
        let reconciler =
            WebhookReconciler::new(store.clone(), registrar.clone(), gateway.clone(), None);

        Self {
            store,
            registrar,
            gateway,
            orders,
            search,
            reconciler,
        }
    }

    pub async fn seed_profile(&self, tier: &str) -> Uuid {
        let id = Uuid::new_v4();
        profile::ActiveModel {
            id: Set(id),
            tier: Set(tier.into()),
            custom_domain: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.store.connection())
        .await
        .expect("seed profile");
        id
    }

    pub async fn profile_domain(&self, profile_id: Uuid) -> Option<String> {
        self.store
            .get_profile(profile_id)
            .await
            .expect("profile lookup")
            .expect("profile exists")
            .custom_domain
    }

    pub async fn order_status(&self, order_id: Uuid) -> DomainOrderStatus {
        self.store
            .get_order(order_id)
            .await
            .expect("order lookup")
            .expect("order exists")
            .status()
            .expect("valid status")
    }

    pub fn last_session_id(&self) -> String {
        let count = self.gateway.checkout_requests.lock().unwrap().len();
        assert!(count > 0, "a checkout session was created");
        format!("cs_test_{}", count - 1)
    }

    /// Drives a freshly created order through checkout completion so renewal
    /// and cancel tests can start from `active`.
    pub async fn activate_order(&self, profile_id: Uuid, domain: &str) -> Uuid {
        let redirect = self
            .orders
            .create_checkout(profile_id, create_request(domain))
            .await
            .expect("create checkout");
        let session = self.last_session_id();
        self.reconciler
            .process(&checkout_completed_event(
                &format!("evt_activate_{}", redirect.order_id.simple()),
                &session,
            ))
            .await
            .expect("process checkout event");
        assert_eq!(
            self.order_status(redirect.order_id).await,
            DomainOrderStatus::Active
        );
        redirect.order_id
    }
}

pub fn contact() -> RegistrantContact {
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

pub fn create_request(domain: &str) -> CreateDomainOrderRequest {
    CreateDomainOrderRequest {
        domain: domain.into(),
        contact: contact(),
    }
}

pub fn checkout_completed_event(event_id: &str, session_id: &str) -> ProcessorEvent {
    ProcessorEvent {
        id: event_id.to_string(),
        kind: PaymentEvent::CheckoutCompleted {
            checkout_session_id: session_id.to_string(),
            subscription_id: Some(format!("sub_for_{session_id}")),
            payment_intent_id: Some(format!("pi_for_{session_id}")),
        },
    }
}

pub fn renewal_failed_event(event_id: &str, subscription_id: &str) -> ProcessorEvent {
    ProcessorEvent {
        id: event_id.to_string(),
        kind: PaymentEvent::RenewalFailed {
            subscription_id: subscription_id.to_string(),
        },
    }
}

pub fn renewal_succeeded_event(
    event_id: &str,
    subscription_id: &str,
    period_end: Option<DateTime<Utc>>,
) -> ProcessorEvent {
    ProcessorEvent {
        id: event_id.to_string(),
        kind: PaymentEvent::RenewalSucceeded {
            subscription_id: subscription_id.to_string(),
            period_end,
        },
    }
}
