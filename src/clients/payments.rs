use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Request to open a recurring checkout for a domain order. The amount is the
/// snapshotted year-one total; the renewal total rides along in metadata so
/// billing reconciliation never re-derives it from market price.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    pub customer_id: String,
    pub domain: String,
    pub amount_cents: i64,
    pub renewal_amount_cents: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Port over the payment processor's customer / checkout / subscription API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Finds or creates the billing customer for a profile; returns its id.
    async fn ensure_customer(&self, profile_id: Uuid, email: &str) -> Result<String, ServiceError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ServiceError>;

    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError>;
}

/// Typed view of an inbound processor event after adapter-side parsing.
/// Exact wire names/shapes stay pluggable behind this adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorEvent {
    pub id: String,
    pub kind: PaymentEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutCompleted {
        checkout_session_id: String,
        subscription_id: Option<String>,
        payment_intent_id: Option<String>,
    },
    RenewalSucceeded {
        subscription_id: String,
        period_end: Option<DateTime<Utc>>,
    },
    RenewalFailed {
        subscription_id: String,
    },
    SubscriptionDeleted {
        subscription_id: String,
    },
    Unhandled {
        event_type: String,
    },
}

/// HTTP adapter for a Stripe-style payment processor.
pub struct StripeGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct CustomerBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CustomerSearchBody {
    #[serde(default)]
    data: Vec<CustomerBody>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionBody {
    id: String,
    url: String,
}

impl StripeGateway {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.external_timeout_secs))
            .build()
            .map_err(|e| ServiceError::PaymentUnavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.payment_api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.payment_secret_key.clone(),
        })
    }

    /// Constructor for tests pointing at a mock server.
    pub fn with_base_url(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ServiceError::PaymentUnavailable(format!("invalid body: {e}")));
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("payment processor returned {status}"));

        if status.is_server_error() || status.as_u16() == 429 {
            Err(ServiceError::PaymentUnavailable(message))
        } else {
            Err(ServiceError::BadRequest(message))
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentUnavailable(e.to_string()))?;
        Self::decode(response).await
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, email))]
    async fn ensure_customer(&self, profile_id: Uuid, email: &str) -> Result<String, ServiceError> {
        let query = format!("metadata['profile_id']:'{profile_id}'");
        let response = self
            .http
            .get(self.url("/v1/customers/search"))
            .bearer_auth(&self.secret_key)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| ServiceError::PaymentUnavailable(e.to_string()))?;
        let found: CustomerSearchBody = Self::decode(response).await?;

        if let Some(existing) = found.data.into_iter().next() {
            return Ok(existing.id);
        }

        let form = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[profile_id]".to_string(), profile_id.to_string()),
        ];
        let created: CustomerBody = self.post_form("/v1/customers", &form).await?;
        Ok(created.id)
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id, domain = %request.domain))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), request.customer_id.clone()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][recurring][interval]".to_string(),
                "year".to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("Custom domain {}", request.domain),
            ),
            (
                "metadata[order_id]".to_string(),
                request.order_id.to_string(),
            ),
            (
                "subscription_data[metadata][order_id]".to_string(),
                request.order_id.to_string(),
            ),
            (
                "subscription_data[metadata][renewal_amount_cents]".to_string(),
                request.renewal_amount_cents.to_string(),
            ),
        ];

        let body: CheckoutSessionBody = self.post_form("/v1/checkout/sessions", &form).await?;
        Ok(CheckoutSession {
            id: body.id,
            url: body.url,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ServiceError> {
        let response = self
            .http
            .delete(self.url(&format!("/v1/subscriptions/{subscription_id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentUnavailable(e.to_string()))?;
        let _: Value = Self::decode(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        let form = vec![(
            "payment_intent".to_string(),
            payment_intent_id.to_string(),
        )];
        let _: Value = self.post_form("/v1/refunds", &form).await?;
        Ok(())
    }
}

/// Verifies an inbound webhook signature before any processing side effect.
///
/// Supports the processor's `Stripe-Signature: t=...,v1=...` scheme and a
/// generic `x-timestamp`/`x-signature` HMAC pair, both with a timestamp
/// tolerance window.
pub fn verify_webhook_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return verify_timestamped(ts, sig, payload, secret, tolerance_secs);
        }
    }

    if let Some(header) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in header.split(',') {
            let mut it = part.trim().splitn(2, '=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return verify_timestamped(ts, v1, payload, secret, tolerance_secs);
        }
    }

    false
}

fn verify_timestamped(
    ts: &str,
    signature: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let signed = format!("{}.{}", ts, String::from_utf8_lossy(payload));
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Parses raw processor JSON into the typed event the reconciler consumes.
///
/// Initial-invoice events are folded into checkout-completed handling; only
/// cycle invoices drive the renewal transitions.
pub fn parse_webhook_event(payload: &[u8]) -> Result<ProcessorEvent, ServiceError> {
    let json: Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {e}")))?;

    let id = json
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::BadRequest("webhook event missing id".into()))?
        .to_string();

    let event_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let object = json.pointer("/data/object").cloned().unwrap_or(Value::Null);

    let str_field = |v: &Value, key: &str| -> Option<String> {
        v.get(key).and_then(|f| f.as_str()).map(str::to_string)
    };

    let kind = match event_type {
        "checkout.session.completed" => PaymentEvent::CheckoutCompleted {
            checkout_session_id: str_field(&object, "id")
                .ok_or_else(|| ServiceError::BadRequest("checkout event missing session id".into()))?,
            subscription_id: str_field(&object, "subscription"),
            payment_intent_id: str_field(&object, "payment_intent"),
        },
        "invoice.payment_succeeded" | "invoice.paid" => {
            let billing_reason = str_field(&object, "billing_reason").unwrap_or_default();
            match (str_field(&object, "subscription"), billing_reason.as_str()) {
                (Some(subscription_id), "subscription_cycle") => PaymentEvent::RenewalSucceeded {
                    subscription_id,
                    period_end: object
                        .get("period_end")
                        .and_then(|v| v.as_i64())
                        .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
                },
                _ => PaymentEvent::Unhandled {
                    event_type: event_type.to_string(),
                },
            }
        }
        "invoice.payment_failed" => {
            let billing_reason = str_field(&object, "billing_reason").unwrap_or_default();
            match (str_field(&object, "subscription"), billing_reason.as_str()) {
                (Some(subscription_id), "subscription_cycle") => {
                    PaymentEvent::RenewalFailed { subscription_id }
                }
                _ => PaymentEvent::Unhandled {
                    event_type: event_type.to_string(),
                },
            }
        }
        "customer.subscription.deleted" => match str_field(&object, "id") {
            Some(subscription_id) => PaymentEvent::SubscriptionDeleted { subscription_id },
            None => PaymentEvent::Unhandled {
                event_type: event_type.to_string(),
            },
        },
        other => PaymentEvent::Unhandled {
            event_type: other.to_string(),
        },
    };

    Ok(ProcessorEvent { id, kind })
}
