//! Migration to create the notifier_preferences and
//! notifier_event_channel_settings tables.
//!
//! Preferences are per-user channel overrides for an event; event channel
//! settings are the admin-configured default channel list for an event.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierPreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierPreferences::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierPreferences::TenantId).uuid().null())
                    .col(
                        ColumnDef::new(NotifierPreferences::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierPreferences::EventKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierPreferences::Channels)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierPreferences::Settings)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierPreferences::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierPreferences::UpdatedAt)
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
                    .name("idx_notifier_preferences_tenant_user_event")
                    .table(NotifierPreferences::Table)
                    .col(NotifierPreferences::TenantId)
                    .col(NotifierPreferences::UserId)
                    .col(NotifierPreferences::EventKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotifierEventChannelSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierEventChannelSettings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NotifierEventChannelSettings::TenantId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(NotifierEventChannelSettings::EventKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierEventChannelSettings::Channels)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NotifierEventChannelSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierEventChannelSettings::UpdatedAt)
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
                    .name("idx_notifier_event_channel_settings_tenant_event")
                    .table(NotifierEventChannelSettings::Table)
                    .col(NotifierEventChannelSettings::TenantId)
                    .col(NotifierEventChannelSettings::EventKey)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(NotifierEventChannelSettings::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(NotifierPreferences::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierPreferences {
    Table,
    Id,
    TenantId,
    UserId,
    EventKey,
    Channels,
    Settings,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum NotifierEventChannelSettings {
    Table,
    Id,
    TenantId,
    EventKey,
    Channels,
    CreatedAt,
    UpdatedAt,
}
