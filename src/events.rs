use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Domain lifecycle events emitted by the orchestrator and the webhook
/// reconciler. Compensating-action outcomes are events too, so failures
/// become visible work items instead of silent drops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        profile_id: Uuid,
        domain: String,
    },
    CheckoutCompleted {
        order_id: Uuid,
    },
    DomainActivated {
        order_id: Uuid,
        profile_id: Uuid,
        domain: String,
    },
    ProvisioningFailed {
        order_id: Uuid,
        domain: String,
        reason: String,
    },
    RefundIssued {
        order_id: Uuid,
        payment_intent_id: String,
    },
    /// Refund exhausted its retry budget; requires manual reconciliation.
    RefundFlaggedForReview {
        order_id: Uuid,
        payment_intent_id: String,
        attempts: u32,
    },
    RenewalFailed {
        order_id: Uuid,
        domain: String,
    },
    RenewalRecovered {
        order_id: Uuid,
        domain: String,
    },
    OrderCancelled {
        order_id: Uuid,
        domain: String,
    },
    /// A teardown side effect (subscription cancel, domain detach) failed
    /// and was skipped; requires manual reconciliation.
    TeardownStepFailed {
        order_id: Uuid,
        step: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a bounded event channel pair.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel for operational visibility. Events that flag
/// manual work are logged at error level so they surface in alerting.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = rx.recv().await {
        match &event {
            Event::RefundFlaggedForReview {
                order_id,
                payment_intent_id,
                attempts,
            } => {
                error!(
                    %order_id,
                    payment_intent_id,
                    attempts,
                    "Refund requires manual review"
                );
            }
            Event::TeardownStepFailed {
                order_id,
                step,
                reason,
            } => {
                error!(%order_id, step, reason, "Teardown step requires manual reconciliation");
            }
            Event::ProvisioningFailed {
                order_id,
                domain,
                reason,
            } => {
                warn!(%order_id, domain, reason, "Domain provisioning failed");
            }
            other => {
                info!(event = ?other, "Domain lifecycle event");
            }
        }
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (sender, mut rx) = channel(8);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated {
                order_id,
                profile_id: Uuid::new_v4(),
                domain: "mydomain.dj".into(),
            })
            .await
            .expect("send");

        match rx.recv().await {
            Some(Event::OrderCreated { order_id: got, .. }) => assert_eq!(got, order_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender
            .send(Event::CheckoutCompleted {
                order_id: Uuid::new_v4()
            })
            .await
            .is_err());
    }
}
