//! Fixed-window admission control.
//!
//! Three independent counters (minute, hour, day) per tenant. Keys embed the
//! truncated wall-clock bucket, so windows roll over when the key changes and
//! stale keys expire after twice their window. A burst straddling a bucket
//! edge can exceed the nominal rate over a rolling window.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::RateLimitConfig;
use crate::error::RepositoryError;
use crate::repositories::RateLimitCounterRepository;
use crate::settings::SettingsStore;
use crate::tenant::TenantContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }

    fn bucket(&self, at: DateTime<Utc>) -> String {
        let format = match self {
            Window::Minute => "%Y-%m-%d-%H-%M",
            Window::Hour => "%Y-%m-%d-%H",
            Window::Day => "%Y-%m-%d",
        };
        at.format(format).to_string()
    }

    /// Counter lifetime, twice the window length.
    pub fn ttl(&self) -> Duration {
        match self {
            Window::Minute => Duration::minutes(2),
            Window::Hour => Duration::hours(2),
            Window::Day => Duration::days(2),
        }
    }

    fn max(&self, limits: &RateLimitConfig) -> u64 {
        match self {
            Window::Minute => limits.max_per_minute,
            Window::Hour => limits.max_per_hour,
            Window::Day => limits.max_per_day,
        }
    }
}

/// Storage for window counters. `increment` must be atomic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(
        &self,
        key: &str,
        ttl: Duration,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn current(&self, key: &str, at: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn purge_expired(&self, at: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Counters in `notifier_rate_limit_counters`, shared by every process.
pub struct SqlCounterStore {
    db: DatabaseConnection,
}

impl SqlCounterStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for SqlCounterStore {
    async fn increment(
        &self,
        key: &str,
        ttl: Duration,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        RateLimitCounterRepository::new(&self.db)
            .increment(key, (at + ttl).fixed_offset())
            .await
    }

    async fn current(&self, key: &str, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        RateLimitCounterRepository::new(&self.db)
            .current(key, at.fixed_offset())
            .await
    }

    async fn purge_expired(&self, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        RateLimitCounterRepository::new(&self.db)
            .purge_expired(at.fixed_offset())
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WindowStatus {
    pub max: u64,
    pub current: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WindowLimits {
    pub minute: WindowStatus,
    pub hour: WindowStatus,
    pub day: WindowStatus,
}

/// Read-only snapshot of the limiter.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub limits: WindowLimits,
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    settings: Arc<SettingsStore>,
    tenant: TenantContext,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        settings: Arc<SettingsStore>,
        tenant: TenantContext,
    ) -> Self {
        Self {
            store,
            settings,
            tenant,
        }
    }

    fn key(tenant_id: Option<Uuid>, window: Window, at: DateTime<Utc>) -> String {
        let scope = tenant_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "global".to_string());
        format!(
            "notifier:rate_limit:{scope}:{}:{}",
            window.as_str(),
            window.bucket(at)
        )
    }

    pub async fn can_send(&self) -> Result<bool, RepositoryError> {
        self.can_send_at(Utc::now()).await
    }

    /// True when limiting is off or every window is strictly below its max.
    pub async fn can_send_at(&self, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let limits = self.settings.rate_limiting().await;
        if !limits.enabled {
            return Ok(true);
        }

        let tenant_id = self.tenant.current();
        for window in Window::ALL {
            let max = window.max(&limits);
            let current = self
                .store
                .current(&Self::key(tenant_id, window, at), at)
                .await?;
            if current >= max {
                tracing::warn!(
                    tenant_id = ?tenant_id,
                    window = window.as_str(),
                    current,
                    limit = max,
                    "Rate limit exceeded"
                );
                counter!("notifier_rate_limited_total", "window" => window.as_str()).increment(1);
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn increment(&self) -> Result<(), RepositoryError> {
        self.increment_at(Utc::now()).await
    }

    /// Add one to all three window counters.
    pub async fn increment_at(&self, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let tenant_id = self.tenant.current();
        for window in Window::ALL {
            self.store
                .increment(&Self::key(tenant_id, window, at), window.ttl(), at)
                .await?;
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<RateLimitStatus, RepositoryError> {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, at: DateTime<Utc>) -> Result<RateLimitStatus, RepositoryError> {
        let limits = self.settings.rate_limiting().await;
        let tenant_id = self.tenant.current();

        let minute = self.window_status(tenant_id, Window::Minute, &limits, at).await?;
        let hour = self.window_status(tenant_id, Window::Hour, &limits, at).await?;
        let day = self.window_status(tenant_id, Window::Day, &limits, at).await?;

        Ok(RateLimitStatus {
            enabled: limits.enabled,
            limits: WindowLimits { minute, hour, day },
        })
    }

    async fn window_status(
        &self,
        tenant_id: Option<Uuid>,
        window: Window,
        limits: &RateLimitConfig,
        at: DateTime<Utc>,
    ) -> Result<WindowStatus, RepositoryError> {
        Ok(WindowStatus {
            max: window.max(limits),
            current: self
                .store
                .current(&Self::key(tenant_id, window, at), at)
                .await?,
        })
    }

    /// Drop expired counters.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        self.store.purge_expired(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keys_encode_tenant_window_and_bucket() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            RateLimiter::key(None, Window::Minute, at),
            "notifier:rate_limit:global:minute:2025-03-04-05-06"
        );
        let tenant = Uuid::nil();
        assert_eq!(
            RateLimiter::key(Some(tenant), Window::Day, at),
            format!("notifier:rate_limit:{tenant}:day:2025-03-04")
        );
    }
}
