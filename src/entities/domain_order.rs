use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter as StrumEnumIter, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;

/// One row per purchase attempt. Terminal rows (`failed`, `cancelled`) are
/// kept for audit and superseded by a fresh row on retry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "domain_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub profile_id: Uuid,

    /// Fully-qualified domain name requested
    pub domain: String,

    pub status: String,

    /// Pricing snapshot captured at order creation; the order is the price
    /// contract even if registrar prices move later.
    pub registrar_purchase_price: Decimal,
    pub registrar_renewal_price: Decimal,
    pub service_fee: Decimal,
    pub term_years: i32,

    /// JSON-serialized registrant contact record
    pub contact_info: String,

    pub payment_checkout_session_id: Option<String>,
    pub payment_subscription_id: Option<String>,

    /// Domain expiry as reported by the registrar; drives renewal-failure
    /// grace-period messaging.
    pub expires_at: Option<DateTime<Utc>>,

    /// Set when the user dismisses a failed order from their active view
    pub is_dismissed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Model {
    pub fn status(&self) -> Result<DomainOrderStatus, ServiceError> {
        self.status
            .parse()
            .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {}", self.status)))
    }

    pub fn contact(&self) -> Result<RegistrantContact, ServiceError> {
        serde_json::from_str(&self.contact_info).map_err(Into::into)
    }

    /// Amount charged for year one.
    pub fn first_year_total(&self) -> Decimal {
        self.registrar_purchase_price + self.service_fee
    }

    /// Amount charged on each subsequent renewal.
    pub fn renewal_total(&self) -> Decimal {
        self.registrar_renewal_price + self.service_fee
    }
}

/// Registrant contact record required by registrars; validated before any
/// checkout is opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct RegistrantContact {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 5, max = 30))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    #[validate(length(equal = 2))]
    pub country_code: String,
}

/// Explicit finite-state machine for a domain order.
///
/// `pending_payment → purchasing → {active | failed}`,
/// `active ⇄ renewal_failed`, `{active, renewal_failed} → cancelled`.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    StrumEnumIter,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DomainOrderStatus {
    PendingPayment,
    Purchasing,
    Active,
    RenewalFailed,
    Failed,
    Cancelled,
}

impl DomainOrderStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Alive = non-terminal. At most one alive order may exist per profile.
    pub fn is_alive(self) -> bool {
        !self.is_terminal()
    }

    /// Billed-and-linked states: the profile's custom_domain points at this
    /// order's domain exactly while it is in one of these.
    pub fn is_linked(self) -> bool {
        matches!(self, Self::Active | Self::RenewalFailed)
    }

    pub fn alive_statuses() -> &'static [DomainOrderStatus] {
        &[
            Self::PendingPayment,
            Self::Purchasing,
            Self::Active,
            Self::RenewalFailed,
        ]
    }

    /// The transition table. Everything not listed here is rejected.
    pub fn can_transition(self, to: DomainOrderStatus) -> bool {
        use DomainOrderStatus::*;
        matches!(
            (self, to),
            (PendingPayment, Purchasing)
                | (Purchasing, Active)
                | (Purchasing, Failed)
                | (Active, RenewalFailed)
                | (RenewalFailed, Active)
                | (Active, Cancelled)
                | (RenewalFailed, Cancelled)
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::ProfileId",
        to = "super::profile::Column::Id"
    )]
    Profile,
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
