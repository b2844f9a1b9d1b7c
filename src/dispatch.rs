//! # Dispatch Orchestrator
//!
//! Entry point for sending notifications. A send resolves the event's
//! template and channel list and filters the channels through the user's
//! preferences. For each remaining channel it passes rate-limit admission,
//! renders the template, then stores a `pending` notification and its
//! delivery job in one transaction. Nothing here talks to a provider.
//!
//! The public send operations never return errors: a misconfigured event or a
//! storage failure is logged and the call yields no notifications, so business
//! code that triggers a notification cannot fail because of it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::ChannelRegistry;
use crate::error::RepositoryError;
use crate::events::EventRegistry;
use crate::models::{ChannelType, Recipient, notification, template};
use crate::preferences::PreferenceResolver;
use crate::rate_limit::RateLimiter;
use crate::repositories::{
    DeliveryJobRepository, NewNotification, NotificationRepository, TemplateRepository, now,
};
use crate::settings::SettingsStore;
use crate::template::{RenderOptions, TemplateRenderer};
use crate::tenant::TenantContext;
use crate::token_cache::{TokenEntry, TrackingTokenCache};
use crate::tracking::generate_tracking_token;

/// Channel used when an event has no configured channel list.
pub const FALLBACK_CHANNEL: ChannelType = ChannelType::Email;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Notification {0} not found")]
    NotFound(Uuid),
    #[error("Notification {0} is still pending")]
    AlreadyPending(Uuid),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Template plus channel list resolved for an event.
struct EventConfig {
    template: template::Model,
    channels: Vec<ChannelType>,
}

/// Collaborators the orchestrator is built from.
pub struct DispatchDeps {
    pub db: DatabaseConnection,
    pub tenant: TenantContext,
    pub events: Arc<EventRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub preferences: Arc<PreferenceResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub settings: Arc<SettingsStore>,
    pub renderer: TemplateRenderer,
    pub token_cache: TrackingTokenCache,
    pub max_attempts: u32,
}

pub struct DispatchOrchestrator {
    db: DatabaseConnection,
    tenant: TenantContext,
    events: Arc<EventRegistry>,
    channels: Arc<ChannelRegistry>,
    preferences: Arc<PreferenceResolver>,
    rate_limiter: Arc<RateLimiter>,
    settings: Arc<SettingsStore>,
    renderer: TemplateRenderer,
    token_cache: TrackingTokenCache,
    max_attempts: u32,
}

impl DispatchOrchestrator {
    pub fn new(deps: DispatchDeps) -> Self {
        Self {
            db: deps.db,
            tenant: deps.tenant,
            events: deps.events,
            channels: deps.channels,
            preferences: deps.preferences,
            rate_limiter: deps.rate_limiter,
            settings: deps.settings,
            renderer: deps.renderer,
            token_cache: deps.token_cache,
            max_attempts: deps.max_attempts,
        }
    }

    /// Send `event_key` to `recipient` on every channel their preferences allow.
    ///
    /// Returns the ids of the notifications created.
    pub async fn send(&self, recipient: &Recipient, event_key: &str, data: JsonValue) -> Vec<Uuid> {
        self.send_filtered(recipient, event_key, &data, None).await
    }

    /// Same as [`send`](Self::send); delivery is always queued.
    pub async fn send_now(
        &self,
        recipient: &Recipient,
        event_key: &str,
        data: JsonValue,
    ) -> Vec<Uuid> {
        self.send(recipient, event_key, data).await
    }

    /// Like [`send`](Self::send), but delivery waits until `scheduled_at`.
    pub async fn schedule(
        &self,
        recipient: &Recipient,
        event_key: &str,
        scheduled_at: DateTime<Utc>,
        data: JsonValue,
    ) -> Vec<Uuid> {
        self.send_filtered(recipient, event_key, &data, Some(scheduled_at))
            .await
    }

    /// Send on one channel regardless of preferences. The channel must be active.
    pub async fn send_to_channel(
        &self,
        recipient: &Recipient,
        event_key: &str,
        channel: ChannelType,
        data: JsonValue,
    ) -> Option<Uuid> {
        let result: Result<Option<Uuid>, RepositoryError> = async {
            let Some(config) = self.event_config(event_key).await? else {
                return Ok(None);
            };
            if !self.channels.is_active(channel).await? {
                warn!(
                    event_key,
                    channel = %channel,
                    user_id = recipient.id,
                    "Channel is not active, skipping direct send"
                );
                return Ok(None);
            }
            self.dispatch_one(recipient, &config.template, channel, &data, event_key, None)
                .await
        }
        .await;

        match result {
            Ok(id) => id,
            Err(err) => {
                error!(
                    event_key,
                    channel = %channel,
                    user_id = recipient.id,
                    error = %err,
                    "Failed to send notification to channel"
                );
                None
            }
        }
    }

    /// Put a `failed` or `sent` notification back to `pending` and queue it again.
    ///
    /// Analytics fields are left untouched.
    pub async fn resend(&self, id: Uuid) -> Result<notification::Model, DispatchError> {
        let tenant_id = self.tenant.current();
        let notifications = NotificationRepository::new(&self.db);

        if notifications.find_by_id(tenant_id, id).await?.is_none() {
            return Err(DispatchError::NotFound(id));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;
        if !NotificationRepository::new(&txn)
            .reset_to_pending(tenant_id, id)
            .await?
        {
            return Err(DispatchError::AlreadyPending(id));
        }
        DeliveryJobRepository::new(&txn)
            .enqueue(tenant_id, id, now(), self.max_attempts)
            .await?;
        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        let notification = notifications
            .find_by_id(tenant_id, id)
            .await?
            .ok_or(DispatchError::NotFound(id))?;
        info!(
            tenant_id = ?tenant_id,
            notification_id = %id,
            channel = %notification.channel,
            "Notification queued for resend"
        );
        Ok(notification)
    }

    async fn send_filtered(
        &self,
        recipient: &Recipient,
        event_key: &str,
        data: &JsonValue,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Vec<Uuid> {
        let config = match self.resolve_for_user(recipient, event_key).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return Vec::new(),
            Err(err) => {
                error!(
                    event_key,
                    user_id = recipient.id,
                    error = %err,
                    "Failed to resolve notification channels"
                );
                return Vec::new();
            }
        };

        let mut created = Vec::new();
        for channel in config.channels {
            match self
                .dispatch_one(recipient, &config.template, channel, data, event_key, scheduled_at)
                .await
            {
                Ok(Some(id)) => created.push(id),
                Ok(None) => {}
                Err(err) => error!(
                    event_key,
                    channel = %channel,
                    user_id = recipient.id,
                    error = %err,
                    "Failed to dispatch notification"
                ),
            }
        }
        created
    }

    /// Event config with its channels narrowed by the user's preferences.
    async fn resolve_for_user(
        &self,
        recipient: &Recipient,
        event_key: &str,
    ) -> Result<Option<EventConfig>, RepositoryError> {
        let Some(mut config) = self.event_config(event_key).await? else {
            return Ok(None);
        };

        let preferences = self
            .preferences
            .effective_channels(recipient.id, event_key)
            .await?;

        let mut allowed = Vec::with_capacity(config.channels.len());
        for channel in config.channels {
            if self.preferences.should_send(channel, &preferences).await? {
                allowed.push(channel);
            } else {
                debug!(
                    event_key,
                    channel = %channel,
                    user_id = recipient.id,
                    "Channel skipped by preferences"
                );
            }
        }
        config.channels = allowed;
        Ok(Some(config))
    }

    /// Active template and channel list for `event_key`, or `None` when unconfigured.
    async fn event_config(&self, event_key: &str) -> Result<Option<EventConfig>, RepositoryError> {
        let tenant_id = self.tenant.current();

        let Some(event) = self.events.get(event_key).await? else {
            warn!(tenant_id = ?tenant_id, event_key, "Event not configured");
            return Ok(None);
        };
        if !event.active {
            warn!(tenant_id = ?tenant_id, event_key, "Event is inactive");
            return Ok(None);
        }

        let Some(template) = TemplateRepository::new(&self.db)
            .find_active_for_event(tenant_id, event_key)
            .await?
        else {
            warn!(tenant_id = ?tenant_id, event_key, "No active template for event");
            return Ok(None);
        };

        let channels = if event.default_channels.is_empty() {
            vec![FALLBACK_CHANNEL]
        } else {
            event.default_channels
        };

        Ok(Some(EventConfig { template, channels }))
    }

    /// Admission, render, then persist and enqueue atomically before counting.
    async fn dispatch_one(
        &self,
        recipient: &Recipient,
        template: &template::Model,
        channel: ChannelType,
        data: &JsonValue,
        event_key: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Uuid>, RepositoryError> {
        let tenant_id = self.tenant.current();

        if !self.rate_limiter.can_send().await? {
            warn!(
                tenant_id = ?tenant_id,
                event_key,
                channel = %channel,
                user_id = recipient.id,
                "Rate limit reached, notification not created"
            );
            return Ok(None);
        }

        let tracking_token = generate_tracking_token();
        let analytics = self.settings.analytics().await;
        let call_data = object_of(data);

        let mut render_data = call_data.clone();
        render_data.insert("user".into(), serde_json::to_value(recipient)?);
        render_data.insert(
            "tracking_token".into(),
            JsonValue::String(tracking_token.clone()),
        );

        let rendered = self.renderer.render(
            template.into(),
            &JsonValue::Object(render_data),
            &RenderOptions {
                channel: Some(channel),
                tracking_token: Some(tracking_token.clone()),
                click_tracking: analytics.enabled && analytics.track_clicks,
                log_unreplaced: self.settings.log_unreplaced_variables().await,
            },
        );

        let mut stored_data = call_data;
        stored_data.insert(
            "tracking_token".into(),
            JsonValue::String(tracking_token.clone()),
        );
        stored_data.insert("event_key".into(), JsonValue::String(event_key.to_string()));

        let scheduled_at = scheduled_at.map(|at| at.fixed_offset());
        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;
        let notification = NotificationRepository::new(&txn)
            .create(NewNotification {
                tenant_id,
                template_id: Some(template.id),
                recipient: recipient.clone(),
                channel,
                subject: rendered.subject,
                content: rendered.content,
                data: JsonValue::Object(stored_data),
                tracking_token: tracking_token.clone(),
                scheduled_at,
            })
            .await?;
        DeliveryJobRepository::new(&txn)
            .enqueue(
                tenant_id,
                notification.id,
                scheduled_at.unwrap_or_else(now),
                self.max_attempts,
            )
            .await?;
        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        self.token_cache
            .put(
                &tracking_token,
                TokenEntry {
                    notification_id: notification.id,
                    tenant_id,
                },
            )
            .await;

        // The row is already queued; a lost increment only loosens the limit.
        if let Err(err) = self.rate_limiter.increment().await {
            warn!(
                tenant_id = ?tenant_id,
                notification_id = %notification.id,
                error = %err,
                "Failed to count notification against the rate limit"
            );
        }

        counter!("notifier_dispatch_total", "channel" => channel.as_str()).increment(1);
        info!(
            tenant_id = ?tenant_id,
            event_key,
            channel = %channel,
            user_id = recipient.id,
            notification_id = %notification.id,
            scheduled = scheduled_at.is_some(),
            "Notification queued"
        );

        Ok(Some(notification.id))
    }
}

/// Call data as a JSON object; non-object payloads contribute nothing.
fn object_of(data: &JsonValue) -> Map<String, JsonValue> {
    match data {
        JsonValue::Object(map) => map.clone(),
        JsonValue::Null => Map::new(),
        other => {
            warn!(kind = json_kind(other), "Notification data is not an object, ignoring it");
            Map::new()
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_of_keeps_objects_and_drops_scalars() {
        assert_eq!(object_of(&json!({"a": 1})).get("a"), Some(&json!(1)));
        assert!(object_of(&json!(null)).is_empty());
        assert!(object_of(&json!([1, 2])).is_empty());
    }
}
