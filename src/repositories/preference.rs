//! # Preference Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::ChannelPreferences;
use crate::models::preference::{
    self, ActiveModel as PreferenceActiveModel, Entity as Preference, Model,
};

pub struct PreferenceRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PreferenceRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        tenant_id: Option<Uuid>,
        user_id: i64,
        event_key: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        Preference::find()
            .filter(tenant_filter(preference::Column::TenantId, tenant_id))
            .filter(preference::Column::UserId.eq(user_id))
            .filter(preference::Column::EventKey.eq(event_key))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn upsert(
        &self,
        tenant_id: Option<Uuid>,
        user_id: i64,
        event_key: &str,
        channels: &ChannelPreferences,
        settings: Option<JsonValue>,
    ) -> Result<Model, RepositoryError> {
        let channels = serde_json::to_value(channels)?;
        let timestamp = now();

        match self.find(tenant_id, user_id, event_key).await? {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.channels = Set(channels);
                if settings.is_some() {
                    model.settings = Set(settings);
                }
                model.updated_at = Set(timestamp);
                model
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => PreferenceActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                user_id: Set(user_id),
                event_key: Set(event_key.to_string()),
                channels: Set(channels),
                settings: Set(settings),
                created_at: Set(timestamp),
                updated_at: Set(timestamp),
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error),
        }
    }
}
