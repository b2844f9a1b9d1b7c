//! Effective channel resolution for a (user, event) pair.
//!
//! Precedence, highest first: an explicit user preference (returned as-is);
//! otherwise the global default channels plus the admin defaults for the
//! event, each enabled, with every other active channel listed as disabled.

use std::collections::BTreeMap;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::channels::ChannelRegistry;
use crate::error::RepositoryError;
use crate::events::{Event, EventRegistry};
use crate::models::{ChannelPreferences, ChannelType};
use crate::repositories::{EventChannelSettingRepository, PreferenceRepository};
use crate::settings::SettingsStore;
use crate::tenant::TenantContext;

/// Why a preference update was refused.
#[derive(Debug, Error)]
pub enum PreferenceUpdateError {
    #[error("User preference override is disabled by administrator.")]
    OverrideDisabled,
    #[error("Event '{0}' not found.")]
    EventNotFound(String),
    #[error("Channel '{0}' is not available or active.")]
    UnknownChannel(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct PreferenceResolver {
    db: DatabaseConnection,
    tenant: TenantContext,
    channels: Arc<ChannelRegistry>,
    events: Arc<EventRegistry>,
    settings: Arc<SettingsStore>,
}

impl PreferenceResolver {
    pub fn new(
        db: DatabaseConnection,
        tenant: TenantContext,
        channels: Arc<ChannelRegistry>,
        events: Arc<EventRegistry>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            db,
            tenant,
            channels,
            events,
            settings,
        }
    }

    /// Channel flags that apply to `user_id` for `event_key`.
    pub async fn effective_channels(
        &self,
        user_id: i64,
        event_key: &str,
    ) -> Result<ChannelPreferences, RepositoryError> {
        let tenant_id = self.tenant.current();

        if let Some(explicit) = PreferenceRepository::new(&self.db)
            .find(tenant_id, user_id, event_key)
            .await?
        {
            return Ok(explicit.channel_preferences());
        }

        let event_defaults = EventChannelSettingRepository::new(&self.db)
            .find(tenant_id, event_key)
            .await?
            .map(|setting| setting.channel_types())
            .unwrap_or_default();

        self.defaults(&event_defaults).await
    }

    async fn defaults(
        &self,
        event_defaults: &[ChannelType],
    ) -> Result<ChannelPreferences, RepositoryError> {
        let global = self.settings.preferences().await.default_channels;

        let mut resolved = ChannelPreferences::new();
        for channel in global.iter().chain(event_defaults) {
            resolved.insert(*channel, true);
        }
        for channel in self.channels.active_channels().await? {
            resolved.entry(channel.channel_type).or_insert(false);
        }
        Ok(resolved)
    }

    /// False when the channel is inactive or explicitly disabled; true otherwise.
    pub async fn should_send(
        &self,
        channel: ChannelType,
        preferences: &ChannelPreferences,
    ) -> Result<bool, RepositoryError> {
        if !self.channels.is_active(channel).await? {
            return Ok(false);
        }

        Ok(preferences.get(&channel).copied().unwrap_or(true))
    }

    /// Resolved flags for display, listing every active channel.
    pub async fn channels_for_display(
        &self,
        user_id: i64,
        event_key: &str,
    ) -> Result<ChannelPreferences, RepositoryError> {
        let mut channels = self.effective_channels(user_id, event_key).await?;
        for channel in self.channels.active_channels().await? {
            channels.entry(channel.channel_type).or_insert(false);
        }
        Ok(channels)
    }

    /// Store an explicit preference after validating it against active channels.
    pub async fn update(
        &self,
        user_id: i64,
        event_key: &str,
        requested: &BTreeMap<String, bool>,
        settings: Option<JsonValue>,
    ) -> Result<(Event, ChannelPreferences), PreferenceUpdateError> {
        let event = self
            .events
            .get(event_key)
            .await?
            .filter(|event| event.active)
            .ok_or_else(|| PreferenceUpdateError::EventNotFound(event_key.to_string()))?;

        if !self.settings.preferences().await.allow_override {
            return Err(PreferenceUpdateError::OverrideDisabled);
        }

        let active: Vec<ChannelType> = self
            .channels
            .active_channels()
            .await?
            .into_iter()
            .map(|channel| channel.channel_type)
            .collect();

        let mut channels = ChannelPreferences::new();
        for (key, enabled) in requested {
            let channel = key
                .parse::<ChannelType>()
                .ok()
                .filter(|channel| active.contains(channel))
                .ok_or_else(|| PreferenceUpdateError::UnknownChannel(key.clone()))?;
            channels.insert(channel, *enabled);
        }

        let stored = PreferenceRepository::new(&self.db)
            .upsert(
                self.tenant.current(),
                user_id,
                &event.key,
                &channels,
                settings,
            )
            .await?;

        tracing::info!(
            tenant_id = ?self.tenant.current(),
            user_id,
            event_key = %event.key,
            "Updated notification preferences"
        );

        Ok((event, stored.channel_preferences()))
    }
}
