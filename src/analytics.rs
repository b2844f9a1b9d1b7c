//! Open and click analytics keyed by tracking token.
//!
//! Tracking requests arrive without tenant context; the tenant is taken from
//! the notification the token resolves to, so its analytics settings apply.

use std::sync::Arc;

use chrono::Duration;
use metrics::counter;
use sea_orm::DatabaseConnection;
use tracing::{debug, info, warn};

use crate::error::RepositoryError;
use crate::repositories::{NotificationRepository, now};
use crate::settings::SettingsStore;
use crate::tenant::TenantContext;
use crate::token_cache::{TokenEntry, TrackingTokenCache};
use crate::tracking::safe_redirect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interaction {
    Open,
    Click,
}

impl Interaction {
    fn as_str(&self) -> &'static str {
        match self {
            Interaction::Open => "open",
            Interaction::Click => "click",
        }
    }
}

pub struct AnalyticsRecorder {
    db: DatabaseConnection,
    tenant: TenantContext,
    settings: Arc<SettingsStore>,
    cache: TrackingTokenCache,
}

impl AnalyticsRecorder {
    pub fn new(
        db: DatabaseConnection,
        tenant: TenantContext,
        settings: Arc<SettingsStore>,
        cache: TrackingTokenCache,
    ) -> Self {
        Self {
            db,
            tenant,
            settings,
            cache,
        }
    }

    /// Count an open. Returns whether anything was recorded.
    pub async fn track_open(&self, token: &str) -> Result<bool, RepositoryError> {
        self.track(token, Interaction::Open).await
    }

    /// Count a click and return the validated redirect target.
    ///
    /// A missing target or a bare `/` is not counted. Lookup or storage
    /// failures are logged; the caller is always redirected.
    pub async fn track_click(&self, token: &str, url: Option<&str>) -> String {
        let target = url.map(str::trim).unwrap_or_default();
        if target.is_empty() || target == "/" {
            return "/".to_string();
        }
        if let Err(err) = self.track(token, Interaction::Click).await {
            warn!(error = %err, "Failed to record click");
        }
        safe_redirect(target)
    }

    async fn track(&self, token: &str, interaction: Interaction) -> Result<bool, RepositoryError> {
        let Some(entry) = self.resolve(token).await? else {
            debug!(kind = interaction.as_str(), "Unknown tracking token");
            return Ok(false);
        };

        self.tenant
            .scope(entry.tenant_id, self.record(entry, interaction))
            .await
    }

    async fn record(
        &self,
        entry: TokenEntry,
        interaction: Interaction,
    ) -> Result<bool, RepositoryError> {
        let analytics = self.settings.analytics().await;
        let enabled = analytics.enabled
            && match interaction {
                Interaction::Open => analytics.track_opens,
                Interaction::Click => analytics.track_clicks,
            };
        if !enabled {
            return Ok(false);
        }

        let notifications = NotificationRepository::new(&self.db);
        let recorded = match interaction {
            Interaction::Open => notifications.record_open(entry.notification_id, now()).await?,
            Interaction::Click => notifications.record_click(entry.notification_id, now()).await?,
        };

        if recorded {
            counter!("notifier_tracking_events_total", "kind" => interaction.as_str()).increment(1);
            debug!(
                tenant_id = ?entry.tenant_id,
                notification_id = %entry.notification_id,
                kind = interaction.as_str(),
                "Recorded tracking event"
            );
        }
        Ok(recorded)
    }

    /// Cache first, then the stored token; database hits are cached again.
    async fn resolve(&self, token: &str) -> Result<Option<TokenEntry>, RepositoryError> {
        if token.is_empty() {
            return Ok(None);
        }
        if let Some(entry) = self.cache.get(token).await {
            return Ok(Some(entry));
        }

        let Some(notification) = NotificationRepository::new(&self.db)
            .find_by_tracking_token(token)
            .await?
        else {
            return Ok(None);
        };

        let entry = TokenEntry {
            notification_id: notification.id,
            tenant_id: notification.tenant_id,
        };
        self.cache.put(token, entry).await;
        Ok(Some(entry))
    }

    /// Clear analytics older than the retention window. Returns the rows affected,
    /// or the rows that would be affected when `dry_run` is set.
    pub async fn cleanup(&self, dry_run: bool) -> Result<u64, RepositoryError> {
        let analytics = self.settings.analytics().await;
        if !analytics.enabled {
            info!("Analytics disabled, skipping retention cleanup");
            return Ok(0);
        }

        let tenant_id = self.tenant.current();
        let cutoff = now() - Duration::days(i64::from(analytics.retention_days));
        let notifications = NotificationRepository::new(&self.db);

        let affected = if dry_run {
            notifications.count_analytics_before(tenant_id, cutoff).await?
        } else {
            notifications.clear_analytics_before(tenant_id, cutoff).await?
        };

        info!(
            tenant_id = ?tenant_id,
            retention_days = analytics.retention_days,
            dry_run,
            affected,
            "Analytics retention cleanup finished"
        );
        Ok(affected)
    }
}
