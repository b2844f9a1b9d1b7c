//! EventChannelSetting entity model
//!
//! Admin-configured default channel list for an event.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::ChannelType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifier_event_channel_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Option<Uuid>,

    pub event_key: String,

    /// JSON array of channel type identifiers
    #[sea_orm(column_type = "JsonBinary")]
    pub channels: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut channels = Vec::new();
        if let JsonValue::Array(items) = &self.channels {
            for channel in items
                .iter()
                .filter_map(JsonValue::as_str)
                .filter_map(|value| value.parse::<ChannelType>().ok())
            {
                if !channels.contains(&channel) {
                    channels.push(channel);
                }
            }
        }
        channels
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
