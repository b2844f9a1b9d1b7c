//! Preference entity model
//!
//! A user's explicit per-event channel choices. Absence of a row means the
//! defaults apply.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{ChannelPreferences, ChannelType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifier_preferences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Option<Uuid>,

    pub user_id: i64,

    pub event_key: String,

    /// Object mapping channel type to an enabled flag
    #[sea_orm(column_type = "JsonBinary")]
    pub channels: JsonValue,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub settings: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decoded channel flags; keys that no longer name a channel type are dropped.
    pub fn channel_preferences(&self) -> ChannelPreferences {
        let JsonValue::Object(entries) = &self.channels else {
            return ChannelPreferences::new();
        };

        entries
            .iter()
            .filter_map(|(key, value)| {
                let channel = key.parse::<ChannelType>().ok()?;
                Some((channel, value.as_bool().unwrap_or(false)))
            })
            .collect()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
