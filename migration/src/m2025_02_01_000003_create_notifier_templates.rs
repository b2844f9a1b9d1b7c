//! Migration to create the notifier_templates table.
//!
//! Templates hold the subject/content pair rendered for an event. Content
//! carries `{{variable}}` placeholders substituted at dispatch time.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierTemplates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierTemplates::TenantId).uuid().null())
                    .col(ColumnDef::new(NotifierTemplates::Name).string().not_null())
                    .col(
                        ColumnDef::new(NotifierTemplates::EventKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierTemplates::Subject)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(NotifierTemplates::Content)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(NotifierTemplates::Variables)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierTemplates::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotifierTemplates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierTemplates::UpdatedAt)
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
                    .name("idx_notifier_templates_tenant_name")
                    .table(NotifierTemplates::Table)
                    .col(NotifierTemplates::TenantId)
                    .col(NotifierTemplates::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifier_templates_tenant_event")
                    .table(NotifierTemplates::Table)
                    .col(NotifierTemplates::TenantId)
                    .col(NotifierTemplates::EventKey)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_notifier_templates_tenant_name",
            "idx_notifier_templates_tenant_event",
        ] {
            manager
                .drop_index(
                    Index::drop()
                        .name(name)
                        .table(NotifierTemplates::Table)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .drop_table(Table::drop().table(NotifierTemplates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierTemplates {
    Table,
    Id,
    TenantId,
    Name,
    EventKey,
    Subject,
    Content,
    Variables,
    Active,
    CreatedAt,
    UpdatedAt,
}
