//! # Channel Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::ChannelType;
use crate::models::channel::{self, ActiveModel as ChannelActiveModel, Entity as Channel, Model};

pub struct ChannelRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<Model>, RepositoryError> {
        Channel::find()
            .filter(tenant_filter(channel::Column::TenantId, tenant_id))
            .order_by_asc(channel::Column::ChannelType)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_type(
        &self,
        tenant_id: Option<Uuid>,
        channel_type: ChannelType,
    ) -> Result<Option<Model>, RepositoryError> {
        Channel::find()
            .filter(tenant_filter(channel::Column::TenantId, tenant_id))
            .filter(channel::Column::ChannelType.eq(channel_type.as_str()))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Create or replace the channel row for `channel_type`.
    pub async fn upsert(
        &self,
        tenant_id: Option<Uuid>,
        channel_type: ChannelType,
        active: bool,
        settings: Option<JsonValue>,
    ) -> Result<Model, RepositoryError> {
        if let Some(value) = &settings
            && !value.is_object()
        {
            return Err(RepositoryError::validation_error(
                "Channel settings must be a JSON object",
            ));
        }

        let timestamp = now();
        match self.find_by_type(tenant_id, channel_type).await? {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.active = Set(active);
                model.settings = Set(settings);
                model.updated_at = Set(timestamp);
                model
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => ChannelActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                channel_type: Set(channel_type.as_str().to_string()),
                title: Set(channel_type.default_title().to_string()),
                icon: Set(None),
                active: Set(active),
                settings: Set(settings),
                created_at: Set(timestamp),
                updated_at: Set(timestamp),
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error),
        }
    }

    /// Make sure a row exists for every channel type, leaving existing rows untouched.
    ///
    /// Newly created rows are active only when `enabled` lists their type.
    pub async fn ensure_defaults(
        &self,
        tenant_id: Option<Uuid>,
        enabled: &[ChannelType],
    ) -> Result<usize, RepositoryError> {
        let mut created = 0;
        for channel_type in ChannelType::ALL {
            if self.find_by_type(tenant_id, channel_type).await?.is_none() {
                self.upsert(tenant_id, channel_type, enabled.contains(&channel_type), None)
                    .await?;
                created += 1;
            }
        }
        Ok(created)
    }
}
