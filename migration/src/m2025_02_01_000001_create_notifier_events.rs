//! Migration to create the notifier_events table.
//!
//! Events are the named trigger points (e.g. `user.registered`) that
//! notifications are dispatched against when the database event source is used.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierEvents::TenantId).uuid().null())
                    .col(ColumnDef::new(NotifierEvents::Key).string().not_null())
                    .col(ColumnDef::new(NotifierEvents::Name).string().not_null())
                    .col(
                        ColumnDef::new(NotifierEvents::EventGroup)
                            .string()
                            .not_null()
                            .default("General"),
                    )
                    .col(ColumnDef::new(NotifierEvents::Description).text().null())
                    .col(
                        ColumnDef::new(NotifierEvents::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotifierEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierEvents::UpdatedAt)
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
                    .name("idx_notifier_events_tenant_key")
                    .table(NotifierEvents::Table)
                    .col(NotifierEvents::TenantId)
                    .col(NotifierEvents::Key)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_notifier_events_tenant_key")
                    .table(NotifierEvents::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(NotifierEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierEvents {
    Table,
    Id,
    TenantId,
    Key,
    Name,
    EventGroup,
    Description,
    Active,
    CreatedAt,
    UpdatedAt,
}
