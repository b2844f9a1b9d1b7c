//! # Template Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{now, tenant_filter};
use crate::error::RepositoryError;
use crate::models::template::{
    self, ActiveModel as TemplateActiveModel, Entity as Template, Model,
};

/// Input for creating a template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub event_key: String,
    pub subject: String,
    pub content: String,
    pub variables: Option<JsonValue>,
    pub active: bool,
}

pub struct TemplateRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TemplateRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        tenant_id: Option<Uuid>,
        input: NewTemplate,
    ) -> Result<Model, RepositoryError> {
        if input.name.trim().is_empty() {
            return Err(RepositoryError::validation_error(
                "Template name cannot be empty",
            ));
        }

        let timestamp = now();
        TemplateActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(input.name),
            event_key: Set(input.event_key),
            subject: Set(input.subject),
            content: Set(input.content),
            variables: Set(input.variables),
            active: Set(input.active),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    /// First active template linked to the event, oldest first.
    pub async fn find_active_for_event(
        &self,
        tenant_id: Option<Uuid>,
        event_key: &str,
    ) -> Result<Option<Model>, RepositoryError> {
        Template::find()
            .filter(tenant_filter(template::Column::TenantId, tenant_id))
            .filter(template::Column::EventKey.eq(event_key))
            .filter(template::Column::Active.eq(true))
            .order_by_asc(template::Column::CreatedAt)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replace the event's primary template, creating it when the event has none.
    ///
    /// The primary template is the oldest one linked to the event, active or not.
    pub async fn upsert_for_event(
        &self,
        tenant_id: Option<Uuid>,
        input: NewTemplate,
    ) -> Result<Model, RepositoryError> {
        let existing = Template::find()
            .filter(tenant_filter(template::Column::TenantId, tenant_id))
            .filter(template::Column::EventKey.eq(input.event_key.as_str()))
            .order_by_asc(template::Column::CreatedAt)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let Some(existing) = existing else {
            return self.create(tenant_id, input).await;
        };
        if input.name.trim().is_empty() {
            return Err(RepositoryError::validation_error(
                "Template name cannot be empty",
            ));
        }

        let mut model = existing.into_active_model();
        model.name = Set(input.name);
        model.subject = Set(input.subject);
        model.content = Set(input.content);
        model.variables = Set(input.variables);
        model.active = Set(input.active);
        model.updated_at = Set(now());
        model
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
