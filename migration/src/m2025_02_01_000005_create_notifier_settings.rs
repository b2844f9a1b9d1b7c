//! Migration to create the notifier_settings key/value table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierSettings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierSettings::TenantId).uuid().null())
                    .col(ColumnDef::new(NotifierSettings::Key).string().not_null())
                    .col(ColumnDef::new(NotifierSettings::Value).json_binary().null())
                    .col(
                        ColumnDef::new(NotifierSettings::SettingGroup)
                            .string()
                            .not_null()
                            .default("general"),
                    )
                    .col(
                        ColumnDef::new(NotifierSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierSettings::UpdatedAt)
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
                    .name("idx_notifier_settings_tenant_key")
                    .table(NotifierSettings::Table)
                    .col(NotifierSettings::TenantId)
                    .col(NotifierSettings::Key)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotifierSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierSettings {
    Table,
    Id,
    TenantId,
    Key,
    Value,
    SettingGroup,
    CreatedAt,
    UpdatedAt,
}
