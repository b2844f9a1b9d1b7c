//! Runtime settings with configuration fallback.
//!
//! Rows in `notifier_settings` override the matching configuration section
//! field by field; missing rows or fields fall back to `AppConfig`.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::config::{AnalyticsConfig, AppConfig, PreferencesConfig, RateLimitConfig};
use crate::error::RepositoryError;
use crate::repositories::SettingRepository;
use crate::tenant::TenantContext;

pub const ANALYTICS_KEY: &str = "analytics";
pub const RATE_LIMITING_KEY: &str = "rate_limiting";
pub const PREFERENCES_KEY: &str = "preferences";
pub const LOG_UNREPLACED_VARIABLES_KEY: &str = "log_unreplaced_variables";

const DEFAULT_GROUP: &str = "general";

pub struct SettingsStore {
    db: DatabaseConnection,
    tenant: TenantContext,
    config: Arc<AppConfig>,
}

impl SettingsStore {
    pub fn new(db: DatabaseConnection, tenant: TenantContext, config: Arc<AppConfig>) -> Self {
        Self { db, tenant, config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn get(&self, key: &str) -> Result<Option<JsonValue>, RepositoryError> {
        Ok(SettingRepository::new(&self.db)
            .find(self.tenant.current(), key)
            .await?
            .and_then(|row| row.value))
    }

    pub async fn set(
        &self,
        key: &str,
        value: JsonValue,
        group: Option<&str>,
    ) -> Result<(), RepositoryError> {
        SettingRepository::new(&self.db)
            .upsert(
                self.tenant.current(),
                key,
                value,
                group.unwrap_or(DEFAULT_GROUP),
            )
            .await?;
        Ok(())
    }

    pub async fn analytics(&self) -> AnalyticsConfig {
        self.section(ANALYTICS_KEY, &self.config.analytics).await
    }

    pub async fn rate_limiting(&self) -> RateLimitConfig {
        self.section(RATE_LIMITING_KEY, &self.config.rate_limiting)
            .await
    }

    pub async fn preferences(&self) -> PreferencesConfig {
        self.section(PREFERENCES_KEY, &self.config.preferences).await
    }

    pub async fn log_unreplaced_variables(&self) -> bool {
        match self.get(LOG_UNREPLACED_VARIABLES_KEY).await {
            Ok(Some(JsonValue::Bool(value))) => value,
            Ok(_) => self.config.log_unreplaced_variables,
            Err(err) => {
                tracing::warn!(error = %err, key = LOG_UNREPLACED_VARIABLES_KEY, "Setting lookup failed, using configuration");
                self.config.log_unreplaced_variables
            }
        }
    }

    async fn section<T>(&self, key: &str, fallback: &T) -> T
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let stored = match self.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return fallback.clone(),
            Err(err) => {
                tracing::warn!(error = %err, key, "Setting lookup failed, using configuration");
                return fallback.clone();
            }
        };

        match overlay(fallback, &stored) {
            Some(value) => value,
            None => {
                tracing::warn!(key, "Stored setting does not match the expected shape, using configuration");
                fallback.clone()
            }
        }
    }
}

/// Apply the fields of a stored JSON object on top of `base`.
fn overlay<T>(base: &T, stored: &JsonValue) -> Option<T>
where
    T: Serialize + DeserializeOwned,
{
    let JsonValue::Object(overrides) = stored else {
        return None;
    };

    let mut merged = serde_json::to_value(base).ok()?;
    let target = merged.as_object_mut()?;
    for (field, value) in overrides {
        target.insert(field.clone(), value.clone());
    }
    serde_json::from_value(merged).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_replaces_only_present_fields() {
        let base = RateLimitConfig::default();
        let merged: RateLimitConfig = overlay(&base, &json!({"max_per_minute": 5})).unwrap();
        assert_eq!(merged.max_per_minute, 5);
        assert_eq!(merged.max_per_hour, base.max_per_hour);
        assert!(merged.enabled);
    }

    #[test]
    fn overlay_rejects_wrong_shapes() {
        let base = AnalyticsConfig::default();
        assert!(overlay(&base, &json!(true)).is_none());
        assert!(overlay(&base, &json!({"retention_days": "ninety"})).is_none());
    }
}
