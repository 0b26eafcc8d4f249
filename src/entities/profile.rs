use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Simplified tenant profile view: only the fields the domain subsystem
/// reads (tier gating) or writes (the denormalized custom_domain pointer).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Subscription tier: "free" or "pro"
    pub tier: String,

    /// Non-null iff an order for this profile is active or renewal_failed,
    /// and equal to that order's domain.
    pub custom_domain: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub const TIER_FREE: &str = "free";
pub const TIER_PRO: &str = "pro";

impl Model {
    pub fn is_paid_tier(&self) -> bool {
        self.tier.eq_ignore_ascii_case(TIER_PRO)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::domain_order::Entity")]
    DomainOrders,
}

impl Related<super::domain_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DomainOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
