//! Migration to create the notifier_rate_limit_counters table.
//!
//! Counters are keyed by tenant, window and time bucket; the bucket is part
//! of the key so a new window starts a fresh row. `expires_at` only drives
//! garbage collection.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierRateLimitCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierRateLimitCounters::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NotifierRateLimitCounters::Count)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(NotifierRateLimitCounters::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifier_rate_limit_counters_expires_at")
                    .table(NotifierRateLimitCounters::Table)
                    .col(NotifierRateLimitCounters::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(NotifierRateLimitCounters::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierRateLimitCounters {
    Table,
    Key,
    Count,
    ExpiresAt,
}
