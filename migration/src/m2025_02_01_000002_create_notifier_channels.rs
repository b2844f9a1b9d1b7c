//! Migration to create the notifier_channels table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotifierChannels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotifierChannels::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NotifierChannels::TenantId).uuid().null())
                    .col(
                        ColumnDef::new(NotifierChannels::ChannelType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(NotifierChannels::Title).string().not_null())
                    .col(ColumnDef::new(NotifierChannels::Icon).string().null())
                    .col(
                        ColumnDef::new(NotifierChannels::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(NotifierChannels::Settings).json_binary().null())
                    .col(
                        ColumnDef::new(NotifierChannels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(NotifierChannels::UpdatedAt)
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
                    .name("idx_notifier_channels_tenant_type")
                    .table(NotifierChannels::Table)
                    .col(NotifierChannels::TenantId)
                    .col(NotifierChannels::ChannelType)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_notifier_channels_tenant_type")
                    .table(NotifierChannels::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(NotifierChannels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum NotifierChannels {
    Table,
    Id,
    TenantId,
    ChannelType,
    Title,
    Icon,
    Active,
    Settings,
    CreatedAt,
    UpdatedAt,
}
