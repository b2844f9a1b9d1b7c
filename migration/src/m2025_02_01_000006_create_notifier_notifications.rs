//! Migration to create the notifier_notifications table.
//!
//! One row per (dispatch, channel) pair. Rows are created `pending` and
//! moved to `sent` or `failed` by the delivery worker; analytics columns are
//! maintained by the tracking endpoints.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierNotifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierNotifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierNotifications::TenantId).uuid().null())
                    .col(
                        ColumnDef::new(NotifierNotifications::TemplateId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::Channel)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::Subject)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::Content)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(NotifierNotifications::Data).json_binary().null())
                    .col(
                        ColumnDef::new(NotifierNotifications::Recipient)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::TrackingToken)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(NotifierNotifications::Error).text().null())
                    .col(
                        ColumnDef::new(NotifierNotifications::ScheduledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::OpenedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::ClickedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::OpensCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::ClicksCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierNotifications::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifier_notifications_tracking_token")
                    .table(NotifierNotifications::Table)
                    .col(NotifierNotifications::TrackingToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifier_notifications_tenant_status_created")
                    .table(NotifierNotifications::Table)
                    .col(NotifierNotifications::TenantId)
                    .col(NotifierNotifications::Status)
                    .col(NotifierNotifications::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotifierNotifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierNotifications {
    Table,
    Id,
    TenantId,
    TemplateId,
    UserId,
    Channel,
    Subject,
    Content,
    Data,
    Recipient,
    TrackingToken,
    Status,
    Error,
    ScheduledAt,
    SentAt,
    OpenedAt,
    ClickedAt,
    OpensCount,
    ClicksCount,
    CreatedAt,
    UpdatedAt,
}
