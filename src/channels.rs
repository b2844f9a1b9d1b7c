//! Channel catalog filtered through the global channel-type allow-list.
//!
//! A tenant's channel rows are created on first use, active for every
//! allow-listed type, so a new tenant only has to supply provider settings.

use std::collections::{HashMap, HashSet};

use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{ChannelType, channel};
use crate::repositories::ChannelRepository;
use crate::tenant::TenantContext;

/// A configured delivery medium.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Channel {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub title: String,
    pub icon: Option<String>,
    pub active: bool,
    /// Provider credentials; never serialized
    #[serde(skip)]
    pub settings: HashMap<String, String>,
}

impl Channel {
    pub(crate) fn from_model(model: &channel::Model) -> Option<Self> {
        Some(Self {
            channel_type: model.channel_type.parse().ok()?,
            title: model.title.clone(),
            icon: model.icon.clone(),
            active: model.active,
            settings: model.settings_map(),
        })
    }
}

pub struct ChannelRegistry {
    db: DatabaseConnection,
    tenant: TenantContext,
    enabled: Vec<ChannelType>,
    seeded: RwLock<HashSet<Uuid>>,
}

impl ChannelRegistry {
    pub fn new(db: DatabaseConnection, tenant: TenantContext, enabled: Vec<ChannelType>) -> Self {
        Self {
            db,
            tenant,
            enabled,
            seeded: RwLock::new(HashSet::new()),
        }
    }

    pub fn is_enabled(&self, channel_type: ChannelType) -> bool {
        self.enabled.contains(&channel_type)
    }

    /// Channels that are both allow-listed and marked active.
    pub async fn active_channels(&self) -> Result<Vec<Channel>, RepositoryError> {
        let tenant_id = self.tenant.current();
        self.ensure_seeded(tenant_id).await?;
        let rows = ChannelRepository::new(&self.db).list(tenant_id).await?;

        Ok(rows
            .iter()
            .filter_map(Channel::from_model)
            .filter(|channel| channel.active && self.is_enabled(channel.channel_type))
            .collect())
    }

    /// The channel row for `channel_type`, hidden when the type is not allow-listed.
    pub async fn get_channel(
        &self,
        channel_type: ChannelType,
    ) -> Result<Option<Channel>, RepositoryError> {
        if !self.is_enabled(channel_type) {
            return Ok(None);
        }

        let tenant_id = self.tenant.current();
        self.ensure_seeded(tenant_id).await?;
        let row = ChannelRepository::new(&self.db)
            .find_by_type(tenant_id, channel_type)
            .await?;
        Ok(row.as_ref().and_then(Channel::from_model))
    }

    /// Store the active flag and provider settings of `channel_type` for the current tenant.
    pub async fn configure(
        &self,
        channel_type: ChannelType,
        active: bool,
        settings: Option<JsonValue>,
    ) -> Result<Channel, RepositoryError> {
        let tenant_id = self.tenant.current();
        self.ensure_seeded(tenant_id).await?;
        let row = ChannelRepository::new(&self.db)
            .upsert(tenant_id, channel_type, active, settings)
            .await?;
        Channel::from_model(&row).ok_or_else(|| {
            RepositoryError::validation_error(format!(
                "Stored channel type '{}' is not recognised",
                row.channel_type
            ))
        })
    }

    /// Create missing channel rows for a tenant the first time it is seen.
    ///
    /// The shared `None` tenant is seeded at startup and by `migrate`.
    async fn ensure_seeded(&self, tenant_id: Option<Uuid>) -> Result<(), RepositoryError> {
        let Some(tenant) = tenant_id else {
            return Ok(());
        };
        if self.seeded.read().await.contains(&tenant) {
            return Ok(());
        }

        let mut seeded = self.seeded.write().await;
        if seeded.contains(&tenant) {
            return Ok(());
        }
        let created = ChannelRepository::new(&self.db)
            .ensure_defaults(Some(tenant), &self.enabled)
            .await?;
        if created > 0 {
            tracing::info!(tenant_id = %tenant, created, "Seeded channel rows for tenant");
        }
        seeded.insert(tenant);
        Ok(())
    }

    pub async fn is_active(&self, channel_type: ChannelType) -> Result<bool, RepositoryError> {
        Ok(self
            .get_channel(channel_type)
            .await?
            .is_some_and(|channel| channel.active))
    }
}
