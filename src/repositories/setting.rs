//! # Setting Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::setting::{self, ActiveModel as SettingActiveModel, Entity as Setting, Model};

pub struct SettingRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SettingRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        tenant_id: Option<Uuid>,
        key: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        Setting::find()
            .filter(tenant_filter(setting::Column::TenantId, tenant_id))
            .filter(setting::Column::Key.eq(key))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn upsert(
        &self,
        tenant_id: Option<Uuid>,
        key: &str,
        value: JsonValue,
        group: &str,
    ) -> Result<Model, RepositoryError> {
        let timestamp = now();
        match self.find(tenant_id, key).await? {
            Some(existing) => {
                let mut model = existing.into_active_model();
                model.value = Set(Some(value));
                model.setting_group = Set(group.to_string());
                model.updated_at = Set(timestamp);
                model
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => SettingActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                key: Set(key.to_string()),
                value: Set(Some(value)),
                setting_group: Set(group.to_string()),
                created_at: Set(timestamp),
                updated_at: Set(timestamp),
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error),
        }
    }
}
