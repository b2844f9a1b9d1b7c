//! Migration to create the notifier_delivery_jobs queue table.
//!
//! Each row is a typed delivery task referencing one notification. Workers
//! claim rows whose `available_at` has passed; delayed (scheduled) sends and
//! retry backoff are both expressed through `available_at`.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierDeliveryJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierDeliveryJobs::TenantId).uuid().null())
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::NotificationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::Status)
                            .string()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::AvailableAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(NotifierDeliveryJobs::LastError).text().null())
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierDeliveryJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifier_delivery_jobs_notification_id")
                            .from(
                                NotifierDeliveryJobs::Table,
                                NotifierDeliveryJobs::NotificationId,
                            )
                            .to(NotifierNotifications::Table, NotifierNotifications::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_notifier_delivery_jobs_status_available ON notifier_delivery_jobs (status, available_at)".to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifier_delivery_jobs_notification")
                    .table(NotifierDeliveryJobs::Table)
                    .col(NotifierDeliveryJobs::NotificationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotifierDeliveryJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierDeliveryJobs {
    Table,
    Id,
    TenantId,
    NotificationId,
    Status,
    Attempts,
    MaxAttempts,
    AvailableAt,
    StartedAt,
    FinishedAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum NotifierNotifications {
    Table,
    Id,
}
