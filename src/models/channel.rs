//! Channel entity model
//!
//! One row per delivery medium per tenant, holding the provider settings the
//! matching transport reads at delivery time.

use std::collections::HashMap;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifier_channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Option<Uuid>,

    /// One of the `ChannelType` identifiers
    pub channel_type: String,

    pub title: String,

    pub icon: Option<String>,

    /// Gates both UI availability and dispatch eligibility
    pub active: bool,

    /// Free-form provider settings (webhook URL, SMTP host, API keys)
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub settings: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Provider settings flattened to strings.
    pub fn settings_map(&self) -> HashMap<String, String> {
        flatten_settings(self.settings.as_ref())
    }
}

/// Flatten a settings object to strings.
///
/// Numbers and booleans are stringified; nested values and nulls are skipped.
pub fn flatten_settings(settings: Option<&JsonValue>) -> HashMap<String, String> {
    let Some(JsonValue::Object(entries)) = settings else {
        return HashMap::new();
    };

    entries
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn settings_map_stringifies_scalars() {
        let now = Utc::now().fixed_offset();
        let model = Model {
            id: Uuid::new_v4(),
            tenant_id: None,
            channel_type: "email".into(),
            title: "Email".into(),
            icon: None,
            active: true,
            settings: Some(json!({
                "smtp_host": "mail.local",
                "smtp_port": 2525,
                "verify": true,
                "nested": {"a": 1},
                "empty": null,
            })),
            created_at: now,
            updated_at: now,
        };

        let map = model.settings_map();
        assert_eq!(map["smtp_host"], "mail.local");
        assert_eq!(map["smtp_port"], "2525");
        assert_eq!(map["verify"], "true");
        assert!(!map.contains_key("nested"));
        assert!(!map.contains_key("empty"));
    }
}
