//! Event catalog.
//!
//! Events come either from configuration or from tenant-scoped database rows,
//! chosen once at startup. Their default channel lists always come from
//! `notifier_event_channel_settings`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{AppConfig, EventDefinitionConfig, EventSourceKind};
use crate::error::RepositoryError;
use crate::models::ChannelType;
use crate::repositories::EventChannelSettingRepository;
use crate::repositories::EventRepository;
use crate::tenant::TenantContext;

/// A named trigger point that notifications are sent against.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Event {
    pub key: String,
    pub name: String,
    pub group: String,
    pub description: Option<String>,
    pub active: bool,
    /// Admin-configured default channels
    pub default_channels: Vec<ChannelType>,
}

/// Backing store for event declarations.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// All declared events for the tenant; `default_channels` is left empty.
    async fn load(&self, tenant_id: Option<Uuid>) -> Result<Vec<Event>, RepositoryError>;
}

/// Events declared in configuration. Every declared event is active.
pub struct StaticEventSource {
    events: BTreeMap<String, EventDefinitionConfig>,
}

impl StaticEventSource {
    pub fn new(events: BTreeMap<String, EventDefinitionConfig>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn load(&self, _tenant_id: Option<Uuid>) -> Result<Vec<Event>, RepositoryError> {
        Ok(self
            .events
            .iter()
            .map(|(key, definition)| Event {
                key: key.clone(),
                name: definition.name.clone(),
                group: definition.group.clone(),
                description: definition.description.clone(),
                active: true,
                default_channels: Vec::new(),
            })
            .collect())
    }
}

/// Events stored in `notifier_events`.
pub struct DatabaseEventSource {
    db: DatabaseConnection,
}

impl DatabaseEventSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventSource for DatabaseEventSource {
    async fn load(&self, tenant_id: Option<Uuid>) -> Result<Vec<Event>, RepositoryError> {
        let rows = EventRepository::new(&self.db).list(tenant_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| Event {
                key: row.key,
                name: row.name,
                group: row.event_group,
                description: row.description,
                active: row.active,
                default_channels: Vec::new(),
            })
            .collect())
    }
}

/// Source selected by `NOTIFIER_EVENT_SOURCE`.
pub fn event_source_from_config(
    config: &AppConfig,
    db: &DatabaseConnection,
) -> Arc<dyn EventSource> {
    match config.event_source {
        EventSourceKind::Static => Arc::new(StaticEventSource::new(config.events.clone())),
        EventSourceKind::Database => Arc::new(DatabaseEventSource::new(db.clone())),
    }
}

pub struct EventRegistry {
    source: Arc<dyn EventSource>,
    db: DatabaseConnection,
    tenant: TenantContext,
}

impl EventRegistry {
    pub fn new(source: Arc<dyn EventSource>, db: DatabaseConnection, tenant: TenantContext) -> Self {
        Self { source, db, tenant }
    }

    /// Every declared event keyed by event key.
    pub async fn all(&self) -> Result<BTreeMap<String, Event>, RepositoryError> {
        let tenant_id = self.tenant.current();
        let mut defaults: HashMap<String, Vec<ChannelType>> =
            EventChannelSettingRepository::new(&self.db)
                .list(tenant_id)
                .await?
                .into_iter()
                .map(|setting| {
                    let channels = setting.channel_types();
                    (setting.event_key, channels)
                })
                .collect();

        Ok(self
            .source
            .load(tenant_id)
            .await?
            .into_iter()
            .map(|mut event| {
                event.default_channels = defaults.remove(&event.key).unwrap_or_default();
                (event.key.clone(), event)
            })
            .collect())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Event>, RepositoryError> {
        let tenant_id = self.tenant.current();
        let Some(mut event) = self
            .source
            .load(tenant_id)
            .await?
            .into_iter()
            .find(|event| event.key == key)
        else {
            return Ok(None);
        };

        event.default_channels = EventChannelSettingRepository::new(&self.db)
            .find(tenant_id, key)
            .await?
            .map(|setting| setting.channel_types())
            .unwrap_or_default();
        Ok(Some(event))
    }

    pub async fn exists(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Events bucketed by group label.
    pub async fn grouped(&self) -> Result<BTreeMap<String, Vec<Event>>, RepositoryError> {
        let mut grouped: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in self.all().await?.into_values() {
            grouped.entry(event.group.clone()).or_default().push(event);
        }
        Ok(grouped)
    }

    /// Replace the admin default channel list for a declared event.
    pub async fn set_default_channels(
        &self,
        key: &str,
        channels: &[ChannelType],
    ) -> Result<Event, RepositoryError> {
        if !self.exists(key).await? {
            return Err(RepositoryError::not_found(format!("Event '{key}'")));
        }

        EventChannelSettingRepository::new(&self.db)
            .upsert(self.tenant.current(), key, channels)
            .await?;

        self.get(key)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("Event '{key}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, group: &str) -> EventDefinitionConfig {
        EventDefinitionConfig {
            name: name.to_string(),
            group: group.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn static_source_marks_every_event_active() {
        let source = StaticEventSource::new(BTreeMap::from([
            ("a.one".to_string(), definition("One", "A")),
            ("b.two".to_string(), definition("Two", "B")),
        ]));

        let events = source.load(None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.active));
        assert_eq!(events[0].key, "a.one");
        assert_eq!(events[1].group, "B");
    }
}
