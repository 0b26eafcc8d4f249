use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, UpdateMany,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::domain_order::{
    self, DomainOrderStatus, Entity as DomainOrderEntity, Model as DomainOrderModel,
};
use crate::entities::processed_webhook_event::{
    self, Entity as ProcessedEventEntity,
};
use crate::entities::profile::{self, Entity as ProfileEntity, Model as ProfileModel};
use crate::errors::ServiceError;

/// Outcome of a status-guarded conditional update. A losing writer observes
/// `AlreadyApplied` and treats the transition as done, which is what makes
/// duplicate and reordered webhook deliveries safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyApplied,
}

impl TransitionOutcome {
    pub fn applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Durable record of domain orders and the profile linkage; the single
/// source of truth for orchestration state. Every status write goes through
/// [`OrderStore::transition`], a conditional update guarded by the expected
/// prior status. There are no unconditional status overwrites.
#[derive(Clone)]
pub struct OrderStore {
    db: Arc<DatabaseConnection>,
}

impl OrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn insert_order(
        &self,
        order: domain_order::ActiveModel,
    ) -> Result<DomainOrderModel, ServiceError> {
        order.insert(&*self.db).await.map_err(Into::into)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<DomainOrderModel>, ServiceError> {
        DomainOrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Number of orders in a non-terminal status for the profile. The
    /// at-most-one-alive invariant means this is 0 or 1 in practice.
    pub async fn count_alive_orders(&self, profile_id: Uuid) -> Result<u64, ServiceError> {
        DomainOrderEntity::find()
            .filter(domain_order::Column::ProfileId.eq(profile_id))
            .filter(alive_condition())
            .count(&*self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn find_alive_order(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<DomainOrderModel>, ServiceError> {
        DomainOrderEntity::find()
            .filter(domain_order::Column::ProfileId.eq(profile_id))
            .filter(alive_condition())
            .order_by_desc(domain_order::Column::CreatedAt)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// The order the dashboard shows: the alive order, or a failed order the
    /// user has not dismissed yet.
    pub async fn find_current_order(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<DomainOrderModel>, ServiceError> {
        let visible_failed = Condition::all()
            .add(domain_order::Column::Status.eq(DomainOrderStatus::Failed.to_string()))
            .add(domain_order::Column::IsDismissed.eq(false));

        DomainOrderEntity::find()
            .filter(domain_order::Column::ProfileId.eq(profile_id))
            .filter(Condition::any().add(alive_condition()).add(visible_failed))
            .order_by_desc(domain_order::Column::CreatedAt)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn find_linked_order(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<DomainOrderModel>, ServiceError> {
        DomainOrderEntity::find()
            .filter(domain_order::Column::ProfileId.eq(profile_id))
            .filter(domain_order::Column::Status.is_in(linked_statuses()))
            .order_by_desc(domain_order::Column::CreatedAt)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DomainOrderModel>, ServiceError> {
        DomainOrderEntity::find()
            .filter(domain_order::Column::PaymentCheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<DomainOrderModel>, ServiceError> {
        DomainOrderEntity::find()
            .filter(domain_order::Column::PaymentSubscriptionId.eq(subscription_id))
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Applies `from → to` as a single conditional update
    /// (`WHERE id = ? AND status IN from`). Transitions outside the table are
    /// rejected outright; a failed precondition is reported as
    /// `AlreadyApplied`, never an error.
    #[instrument(skip(self, mutate), fields(order_id = %order_id, to = %to))]
    pub async fn transition<F>(
        &self,
        order_id: Uuid,
        from: &[DomainOrderStatus],
        to: DomainOrderStatus,
        mutate: F,
    ) -> Result<TransitionOutcome, ServiceError>
    where
        F: FnOnce(UpdateMany<DomainOrderEntity>) -> UpdateMany<DomainOrderEntity>,
    {
        if from.is_empty() || from.iter().any(|f| !f.can_transition(to)) {
            return Err(ServiceError::ValidationError(format!(
                "Transition {:?} -> {} is not permitted",
                from, to
            )));
        }

        let update = DomainOrderEntity::update_many()
            .col_expr(domain_order::Column::Status, Expr::value(to.to_string()))
            .col_expr(domain_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                domain_order::Column::Version,
                Expr::col(domain_order::Column::Version).add(1),
            )
            .filter(domain_order::Column::Id.eq(order_id))
            .filter(
                domain_order::Column::Status
                    .is_in(from.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
            );

        let result = mutate(update).exec(&*self.db).await?;

        if result.rows_affected > 0 {
            info!(%order_id, %to, "Order transitioned");
            Ok(TransitionOutcome::Applied)
        } else {
            Ok(TransitionOutcome::AlreadyApplied)
        }
    }

    /// Refreshes the registrar-reported expiry on an active order, e.g. when
    /// a cycle invoice settles. Guarded on `active` so a stale event cannot
    /// resurrect a torn-down order's expiry.
    pub async fn refresh_expiry(
        &self,
        order_id: Uuid,
        expires_at: chrono::DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        DomainOrderEntity::update_many()
            .col_expr(
                domain_order::Column::ExpiresAt,
                Expr::value(Some(expires_at)),
            )
            .col_expr(domain_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(domain_order::Column::Id.eq(order_id))
            .filter(domain_order::Column::Status.eq(DomainOrderStatus::Active.to_string()))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Marks a failed order as dismissed from the user's active view. The row
    /// itself is kept for audit.
    pub async fn dismiss_failed_order(
        &self,
        profile_id: Uuid,
        order_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = DomainOrderEntity::update_many()
            .col_expr(domain_order::Column::IsDismissed, Expr::value(true))
            .col_expr(domain_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(domain_order::Column::Id.eq(order_id))
            .filter(domain_order::Column::ProfileId.eq(profile_id))
            .filter(domain_order::Column::Status.eq(DomainOrderStatus::Failed.to_string()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn get_profile(&self, profile_id: Uuid) -> Result<Option<ProfileModel>, ServiceError> {
        ProfileEntity::find_by_id(profile_id)
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn set_profile_domain(
        &self,
        profile_id: Uuid,
        domain: Option<&str>,
    ) -> Result<(), ServiceError> {
        ProfileEntity::update_many()
            .col_expr(
                profile::Column::CustomDomain,
                Expr::value(domain.map(str::to_string)),
            )
            .col_expr(profile::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profile::Column::Id.eq(profile_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// True when the event id already sits in the dedup ledger.
    pub async fn is_event_processed(&self, event_id: &str) -> Result<bool, ServiceError> {
        let found = ProcessedEventEntity::find_by_id(event_id.to_string())
            .one(&*self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Records the event id in the ledger. Concurrent deliveries may race
    /// here; the conflict is ignored because the status-guarded transitions
    /// already absorbed the duplicate work.
    pub async fn mark_event_processed(&self, event_id: &str) -> Result<(), ServiceError> {
        let row = processed_webhook_event::ActiveModel {
            event_id: Set(event_id.to_string()),
            received_at: Set(Utc::now()),
        };
        let insert = ProcessedEventEntity::insert(row)
            .on_conflict(
                OnConflict::column(processed_webhook_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&*self.db)
            .await;

        match insert {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn alive_condition() -> Condition {
    Condition::all().add(
        domain_order::Column::Status.is_in(
            DomainOrderStatus::alive_statuses()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        ),
    )
}

fn linked_statuses() -> Vec<String> {
    vec![
        DomainOrderStatus::Active.to_string(),
        DomainOrderStatus::RenewalFailed.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::domain_order::RegistrantContact;
    use rust_decimal_macros::dec;

    async fn store() -> OrderStore {
        let db = crate::db::connect_in_memory()
            .await
            .expect("sqlite connection");
        crate::db::run_migrations(&db).await.expect("migrations");
        OrderStore::new(Arc::new(db))
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

    async fn seed_profile(store: &OrderStore, tier: &str) -> Uuid {
        let id = Uuid::new_v4();
        let model = profile::ActiveModel {
            id: Set(id),
            tier: Set(tier.into()),
            custom_domain: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        model.insert(store.connection()).await.expect("profile");
        id
    }

    async fn seed_order(
        store: &OrderStore,
        profile_id: Uuid,
        status: DomainOrderStatus,
    ) -> DomainOrderModel {
        let order = domain_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            profile_id: Set(profile_id),
            domain: Set("mydomain.dj".into()),
            status: Set(status.to_string()),
            registrar_purchase_price: Set(dec!(34.00)),
            registrar_renewal_price: Set(dec!(30.00)),
            service_fee: Set(dec!(12.00)),
            term_years: Set(1),
            contact_info: Set(serde_json::to_string(&contact()).unwrap()),
            payment_checkout_session_id: Set(Some("cs_test".into())),
            payment_subscription_id: Set(None),
            expires_at: Set(None),
            is_dismissed: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        };
        store.insert_order(order).await.expect("order")
    }

    #[tokio::test]
    async fn guarded_transition_applies_once() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;
        let order = seed_order(&store, profile_id, DomainOrderStatus::PendingPayment).await;

        let first = store
            .transition(
                order.id,
                &[DomainOrderStatus::PendingPayment],
                DomainOrderStatus::Purchasing,
                |u| u,
            )
            .await
            .unwrap();
        assert_eq!(first, TransitionOutcome::Applied);

        // Replaying the same transition finds the precondition gone.
        let second = store
            .transition(
                order.id,
                &[DomainOrderStatus::PendingPayment],
                DomainOrderStatus::Purchasing,
                |u| u,
            )
            .await
            .unwrap();
        assert_eq!(second, TransitionOutcome::AlreadyApplied);

        let reloaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status().unwrap(), DomainOrderStatus::Purchasing);
        assert_eq!(reloaded.version, 2);
    }

    #[tokio::test]
    async fn transitions_outside_the_table_are_rejected() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;
        let order = seed_order(&store, profile_id, DomainOrderStatus::PendingPayment).await;

        let err = store
            .transition(
                order.id,
                &[DomainOrderStatus::PendingPayment],
                DomainOrderStatus::Active,
                |u| u,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        let untouched = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(
            untouched.status().unwrap(),
            DomainOrderStatus::PendingPayment
        );
    }

    #[tokio::test]
    async fn alive_count_ignores_terminal_orders() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;
        seed_order(&store, profile_id, DomainOrderStatus::Failed).await;
        seed_order(&store, profile_id, DomainOrderStatus::Cancelled).await;
        assert_eq!(store.count_alive_orders(profile_id).await.unwrap(), 0);

        seed_order(&store, profile_id, DomainOrderStatus::Active).await;
        assert_eq!(store.count_alive_orders(profile_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn current_order_includes_undismissed_failures() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;
        let failed = seed_order(&store, profile_id, DomainOrderStatus::Failed).await;

        let visible = store.find_current_order(profile_id).await.unwrap();
        assert_eq!(visible.map(|o| o.id), Some(failed.id));

        assert!(store
            .dismiss_failed_order(profile_id, failed.id)
            .await
            .unwrap());
        assert!(store.find_current_order(profile_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn event_ledger_dedupes() {
        let store = store().await;
        assert!(!store.is_event_processed("evt_1").await.unwrap());
        store.mark_event_processed("evt_1").await.unwrap();
        assert!(store.is_event_processed("evt_1").await.unwrap());
        // Replaying the insert is a no-op, not an error.
        store.mark_event_processed("evt_1").await.unwrap();
    }

    #[tokio::test]
    async fn profile_linkage_set_and_clear() {
        let store = store().await;
        let profile_id = seed_profile(&store, "pro").await;

        store
            .set_profile_domain(profile_id, Some("mydomain.dj"))
            .await
            .unwrap();
        let profile = store.get_profile(profile_id).await.unwrap().unwrap();
        assert_eq!(profile.custom_domain.as_deref(), Some("mydomain.dj"));

        store.set_profile_domain(profile_id, None).await.unwrap();
        let profile = store.get_profile(profile_id).await.unwrap().unwrap();
        assert!(profile.custom_domain.is_none());
    }
}
