//! # Event Channel Setting Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::ChannelType;
use crate::models::event_channel_setting::{
    self, ActiveModel as SettingActiveModel, Entity as EventChannelSetting, Model,
};

pub struct EventChannelSettingRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EventChannelSettingRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        tenant_id: Option<Uuid>,
        event_key: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        EventChannelSetting::find()
            .filter(tenant_filter(
                event_channel_setting::Column::TenantId,
                tenant_id,
            ))
            .filter(event_channel_setting::Column::EventKey.eq(event_key))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<Model>, RepositoryError> {
        EventChannelSetting::find()
            .filter(tenant_filter(
                event_channel_setting::Column::TenantId,
                tenant_id,
            ))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replace the admin default channel list for an event.
    pub async fn upsert(
        &self,
        tenant_id: Option<Uuid>,
        event_key: &str,
        channels: &[ChannelType],
    ) -> Result<Model, RepositoryError> {
        let mut unique: Vec<ChannelType> = Vec::with_capacity(channels.len());
        for channel in channels {
            if !unique.contains(channel) {
                unique.push(*channel);
            }
        }
        let channels = serde_json::to_value(&unique)?;
        let timestamp = now();

        match self.find(tenant_id, event_key).await? {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.channels = Set(channels);
                model.updated_at = Set(timestamp);
                model
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => SettingActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                event_key: Set(event_key.to_string()),
                channels: Set(channels),
                created_at: Set(timestamp),
                updated_at: Set(timestamp),
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error),
        }
    }
}
