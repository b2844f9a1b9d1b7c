//! # Event Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::event::{self, ActiveModel as EventActiveModel, Entity as Event, Model};

/// Fields accepted when declaring an event row.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub key: String,
    pub name: String,
    pub group: String,
    pub description: Option<String>,
    pub active: bool,
}

pub struct EventRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EventRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// All events for the tenant ordered by group then key.
    pub async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<Model>, RepositoryError> {
        Event::find()
            .filter(tenant_filter(event::Column::TenantId, tenant_id))
            .order_by_asc(event::Column::EventGroup)
            .order_by_asc(event::Column::Key)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_key(
        &self,
        tenant_id: Option<Uuid>,
        key: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        Event::find()
            .filter(tenant_filter(event::Column::TenantId, tenant_id))
            .filter(event::Column::Key.eq(key))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Insert or update the event identified by `record.key`.
    pub async fn upsert(
        &self,
        tenant_id: Option<Uuid>,
        record: EventRecord,
    ) -> Result<Model, RepositoryError> {
        if record.key.trim().is_empty() {
            return Err(RepositoryError::validation_error("Event key cannot be empty"));
        }

        let timestamp = now();
        match self.find_by_key(tenant_id, &record.key).await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.name = Set(record.name);
                active.event_group = Set(record.group);
                active.description = Set(record.description);
                active.active = Set(record.active);
                active.updated_at = Set(timestamp);
                active
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => EventActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                key: Set(record.key),
                name: Set(record.name),
                event_group: Set(record.group),
                description: Set(record.description),
                active: Set(record.active),
                created_at: Set(timestamp),
                updated_at: Set(timestamp),
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error),
        }
    }
}
