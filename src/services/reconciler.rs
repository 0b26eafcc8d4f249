use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use tracing::{debug, error, info, instrument, warn};

use crate::clients::payments::{PaymentEvent, PaymentGateway, ProcessorEvent};
use crate::clients::registrar::{PurchaseRequest, RegistrarApi};
use crate::entities::domain_order::{self, DomainOrderStatus, Model as DomainOrderModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::order_store::OrderStore;

const REFUND_ATTEMPTS: u32 = 3;
const REFUND_BACKOFF: Duration = Duration::from_millis(100);

/// Consumes payment-processor events from the at-least-once webhook channel
/// and advances order state idempotently.
///
/// Safety comes from two layers: the processed-event ledger makes replay of
/// the *same* event a no-op, and status-guarded transitions make reordered or
/// duplicate deliveries of *different* events collapse into no-ops when their
/// precondition no longer holds.
#[derive(Clone)]
pub struct WebhookReconciler {
    store: OrderStore,
    registrar: Arc<dyn RegistrarApi>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl WebhookReconciler {
    pub fn new(
        store: OrderStore,
        registrar: Arc<dyn RegistrarApi>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            registrar,
            gateway,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to emit domain lifecycle event");
            }
        }
    }

    /// Processes one inbound event. Returning an error means "retry later";
    /// business-level failures (provisioning, refunds) are absorbed into the
    /// state machine instead and never bubble up to the delivery channel.
    ///
    /// The ledger is written after successful processing, so an event whose
    /// processing died mid-way is re-run on redelivery; the guarded
    /// transitions and the registrar idempotency key make the re-run safe.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn process(&self, event: &ProcessorEvent) -> Result<(), ServiceError> {
        if self.store.is_event_processed(&event.id).await? {
            info!(event_id = %event.id, "Webhook event already processed");
            return Ok(());
        }

        match &event.kind {
            PaymentEvent::CheckoutCompleted {
                checkout_session_id,
                subscription_id,
                payment_intent_id,
            } => {
                self.handle_checkout_completed(
                    checkout_session_id,
                    subscription_id.as_deref(),
                    payment_intent_id.as_deref(),
                )
                .await?;
            }
            PaymentEvent::RenewalSucceeded {
                subscription_id,
                period_end,
            } => {
                self.handle_renewal_succeeded(subscription_id, *period_end)
                    .await?;
            }
            PaymentEvent::RenewalFailed { subscription_id } => {
                self.handle_renewal_failed(subscription_id).await?;
            }
            PaymentEvent::SubscriptionDeleted { subscription_id } => {
                // Cancellation is user-driven and already recorded locally.
                debug!(subscription_id, "Subscription deletion acknowledged");
            }
            PaymentEvent::Unhandled { event_type } => {
                debug!(event_type, "Ignoring unhandled webhook event type");
            }
        }

        self.store.mark_event_processed(&event.id).await
    }

    async fn handle_checkout_completed(
        &self,
        checkout_session_id: &str,
        subscription_id: Option<&str>,
        payment_intent_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        let Some(order) = self
            .store
            .find_by_checkout_session(checkout_session_id)
            .await?
        else {
            warn!(checkout_session_id, "Checkout event for unknown session");
            return Ok(());
        };

        match order.status()? {
            DomainOrderStatus::PendingPayment => {
                let subscription = subscription_id.map(str::to_string);
                let outcome = self
                    .store
                    .transition(
                        order.id,
                        &[DomainOrderStatus::PendingPayment],
                        DomainOrderStatus::Purchasing,
                        |update| {
                            update.col_expr(
                                domain_order::Column::PaymentSubscriptionId,
                                Expr::value(subscription),
                            )
                        },
                    )
                    .await?;
                if outcome.applied() {
                    self.emit(Event::CheckoutCompleted { order_id: order.id }).await;
                }
                self.provision(order.id, payment_intent_id).await
            }
            // A redelivery after a crash mid-provisioning resumes here; the
            // registrar call is idempotency-keyed on the order id.
            DomainOrderStatus::Purchasing => self.provision(order.id, payment_intent_id).await,
            status => {
                info!(order_id = %order.id, %status, "Checkout event arrived after order advanced");
                Ok(())
            }
        }
    }

    /// Runs the registrar-side purchase + attachment for a `purchasing`
    /// order, then lands it in `active` or `failed` (with compensations).
    async fn provision(
        &self,
        order_id: uuid::Uuid,
        payment_intent_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        let Some(order) = self.store.get_order(order_id).await? else {
            return Ok(());
        };
        if order.status()? != DomainOrderStatus::Purchasing {
            return Ok(());
        }

        let request = PurchaseRequest {
            order_id: order.id,
            domain: order.domain.clone(),
            contact: order.contact()?,
            expected_price: order.registrar_purchase_price,
            term_years: order.term_years,
        };

        match self.registrar.purchase_and_attach(&request).await {
            Ok(attached) => {
                let outcome = self
                    .store
                    .transition(
                        order.id,
                        &[DomainOrderStatus::Purchasing],
                        DomainOrderStatus::Active,
                        |update| {
                            update.col_expr(
                                domain_order::Column::ExpiresAt,
                                Expr::value(attached.expires_at),
                            )
                        },
                    )
                    .await?;

                if outcome.applied() {
                    self.store
                        .set_profile_domain(order.profile_id, Some(&order.domain))
                        .await?;
                    self.emit(Event::DomainActivated {
                        order_id: order.id,
                        profile_id: order.profile_id,
                        domain: order.domain.clone(),
                    })
                    .await;
                }
                Ok(())
            }
            Err(provisioning_error) => {
                error!(
                    order_id = %order.id,
                    domain = %order.domain,
                    error = %provisioning_error,
                    "Registrar provisioning failed"
                );

                let outcome = self
                    .store
                    .transition(
                        order.id,
                        &[DomainOrderStatus::Purchasing],
                        DomainOrderStatus::Failed,
                        |update| update,
                    )
                    .await?;

                // Compensate exactly once, on the delivery that won the
                // transition. A refund failure never reverts `failed`; it is
                // flagged for manual review instead.
                if outcome.applied() {
                    self.compensate(&order, payment_intent_id).await;
                    self.emit(Event::ProvisioningFailed {
                        order_id: order.id,
                        domain: order.domain.clone(),
                        reason: provisioning_error.to_string(),
                    })
                    .await;
                }
                Ok(())
            }
        }
    }

    /// Issues the money-safety compensations for a failed provisioning:
    /// refund the year-one charge (bounded retries) and cancel the
    /// just-created subscription.
    async fn compensate(&self, order: &DomainOrderModel, payment_intent_id: Option<&str>) {
        match payment_intent_id {
            Some(payment_intent) => {
                let mut refunded = false;
                for attempt in 1..=REFUND_ATTEMPTS {
                    match self.gateway.refund(payment_intent).await {
                        Ok(()) => {
                            self.emit(Event::RefundIssued {
                                order_id: order.id,
                                payment_intent_id: payment_intent.to_string(),
                            })
                            .await;
                            refunded = true;
                            break;
                        }
                        Err(e) => {
                            warn!(
                                order_id = %order.id,
                                attempt,
                                error = %e,
                                "Refund attempt failed"
                            );
                            if attempt < REFUND_ATTEMPTS {
                                tokio::time::sleep(REFUND_BACKOFF * attempt).await;
                            }
                        }
                    }
                }
                if !refunded {
                    error!(
                        order_id = %order.id,
                        payment_intent,
                        "Refund exhausted retry budget; flagging for manual review"
                    );
                    self.emit(Event::RefundFlaggedForReview {
                        order_id: order.id,
                        payment_intent_id: payment_intent.to_string(),
                        attempts: REFUND_ATTEMPTS,
                    })
                    .await;
                }
            }
            None => {
                error!(
                    order_id = %order.id,
                    "No payment intent on checkout event; refund needs manual review"
                );
                self.emit(Event::RefundFlaggedForReview {
                    order_id: order.id,
                    payment_intent_id: "unknown".to_string(),
                    attempts: 0,
                })
                .await;
            }
        }

        if let Some(subscription_id) = order.payment_subscription_id.as_deref() {
            if let Err(e) = self.gateway.cancel_subscription(subscription_id).await {
                warn!(order_id = %order.id, error = %e, "Subscription cancel failed after provisioning failure");
                self.emit(Event::TeardownStepFailed {
                    order_id: order.id,
                    step: "cancel_subscription".into(),
                    reason: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn handle_renewal_succeeded(
        &self,
        subscription_id: &str,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<(), ServiceError> {
        let Some(order) = self.store.find_by_subscription(subscription_id).await? else {
            warn!(subscription_id, "Renewal event for unknown subscription");
            return Ok(());
        };

        match order.status()? {
            DomainOrderStatus::RenewalFailed => {
                let outcome = self
                    .store
                    .transition(
                        order.id,
                        &[DomainOrderStatus::RenewalFailed],
                        DomainOrderStatus::Active,
                        |update| match period_end {
                            Some(expiry) => update.col_expr(
                                domain_order::Column::ExpiresAt,
                                Expr::value(Some(expiry)),
                            ),
                            None => update,
                        },
                    )
                    .await?;
                if outcome.applied() {
                    self.emit(Event::RenewalRecovered {
                        order_id: order.id,
                        domain: order.domain.clone(),
                    })
                    .await;
                }
            }
            DomainOrderStatus::Active => {
                if let Some(expiry) = period_end {
                    self.store.refresh_expiry(order.id, expiry).await?;
                }
            }
            status => {
                // A stale success arriving after cancel/failure fails its
                // precondition and is dropped; accepted ordering limitation.
                info!(order_id = %order.id, %status, "Stale renewal success ignored");
            }
        }
        Ok(())
    }

    async fn handle_renewal_failed(&self, subscription_id: &str) -> Result<(), ServiceError> {
        let Some(order) = self.store.find_by_subscription(subscription_id).await? else {
            warn!(subscription_id, "Renewal failure for unknown subscription");
            return Ok(());
        };

        // Soft failure: the domain and the profile linkage stay intact until
        // expires_at; nothing is torn down here.
        let outcome = self
            .store
            .transition(
                order.id,
                &[DomainOrderStatus::Active],
                DomainOrderStatus::RenewalFailed,
                |update| update,
            )
            .await?;

        if outcome.applied() {
            self.emit(Event::RenewalFailed {
                order_id: order.id,
                domain: order.domain.clone(),
            })
            .await;
        }
        Ok(())
    }
}
