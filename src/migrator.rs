use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_profiles_table::Migration),
            Box::new(m20250301_000002_create_domain_orders_table::Migration),
            Box::new(m20250301_000003_create_processed_webhook_events_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250301_000001_create_profiles_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_profiles_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Profiles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Profiles::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Profiles::Tier)
                                .string()
                                .not_null()
                                .default("free"),
                        )
                        .col(ColumnDef::new(Profiles::CustomDomain).string().null())
                        .col(ColumnDef::new(Profiles::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Profiles::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Profiles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Profiles {
        Table,
        Id,
        Tier,
        CustomDomain,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000002_create_domain_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_domain_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DomainOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DomainOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DomainOrders::ProfileId).uuid().not_null())
                        .col(ColumnDef::new(DomainOrders::Domain).string().not_null())
                        .col(ColumnDef::new(DomainOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(DomainOrders::RegistrarPurchasePrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DomainOrders::RegistrarRenewalPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DomainOrders::ServiceFee)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DomainOrders::TermYears)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(DomainOrders::ContactInfo).text().not_null())
                        .col(
                            ColumnDef::new(DomainOrders::PaymentCheckoutSessionId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(DomainOrders::PaymentSubscriptionId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(DomainOrders::ExpiresAt).timestamp().null())
                        .col(
                            ColumnDef::new(DomainOrders::IsDismissed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(DomainOrders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(DomainOrders::UpdatedAt).timestamp().null())
                        .col(
                            ColumnDef::new(DomainOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_domain_orders_profile_id")
                        .table(DomainOrders::Table)
                        .col(DomainOrders::ProfileId)
                        .to_owned(),
                )
                .await?;

            // Webhook lookups resolve orders by processor object ids
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_domain_orders_checkout_session")
                        .table(DomainOrders::Table)
                        .col(DomainOrders::PaymentCheckoutSessionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_domain_orders_subscription")
                        .table(DomainOrders::Table)
                        .col(DomainOrders::PaymentSubscriptionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DomainOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DomainOrders {
        Table,
        Id,
        ProfileId,
        Domain,
        Status,
        RegistrarPurchasePrice,
        RegistrarRenewalPrice,
        ServiceFee,
        TermYears,
        ContactInfo,
        PaymentCheckoutSessionId,
        PaymentSubscriptionId,
        ExpiresAt,
        IsDismissed,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20250301_000003_create_processed_webhook_events_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_processed_webhook_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProcessedWebhookEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProcessedWebhookEvents::EventId)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProcessedWebhookEvents::ReceivedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(ProcessedWebhookEvents::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProcessedWebhookEvents {
        Table,
        EventId,
        ReceivedAt,
    }
}
