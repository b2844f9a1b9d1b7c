//! Notification entity model
//!
//! The central mutable record: created `pending` by dispatch, moved to
//! `sent`/`failed` by the delivery worker, and annotated with open/click
//! analytics by the tracking endpoints.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{ChannelType, NotificationStatus, Recipient};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifier_notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Option<Uuid>,

    /// Template the content was rendered from, if any
    pub template_id: Option<Uuid>,

    pub user_id: i64,

    pub channel: String,

    #[sea_orm(column_type = "Text")]
    pub subject: String,

    /// Rendered body
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Original call data plus `tracking_token` and `event_key`
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub data: Option<JsonValue>,

    /// Address snapshot for transports
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub recipient: Option<JsonValue>,

    /// Opaque key used by tracking callbacks
    #[sea_orm(unique)]
    pub tracking_token: String,

    /// pending, sent or failed
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub error: Option<String>,
    pub scheduled_at: Option<DateTimeWithTimeZone>,
    pub sent_at: Option<DateTimeWithTimeZone>,
    pub opened_at: Option<DateTimeWithTimeZone>,
    pub clicked_at: Option<DateTimeWithTimeZone>,

    pub opens_count: i32,
    pub clicks_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn channel_type(&self) -> Option<ChannelType> {
        self.channel.parse().ok()
    }

    pub fn status(&self) -> Option<NotificationStatus> {
        self.status.parse().ok()
    }

    pub fn is_sent(&self) -> bool {
        self.status() == Some(NotificationStatus::Sent)
    }

    /// Decoded recipient snapshot, falling back to a bare user id.
    pub fn recipient(&self) -> Recipient {
        self.recipient
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_else(|| Recipient::new(self.user_id))
    }

    /// Event key recorded in `data` at dispatch time.
    pub fn event_key(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("event_key"))
            .and_then(JsonValue::as_str)
    }

    /// Token copy stored in `data` at dispatch time.
    pub fn data_tracking_token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("tracking_token"))
            .and_then(JsonValue::as_str)
    }

    pub fn has_analytics(&self) -> bool {
        self.opened_at.is_some()
            || self.clicked_at.is_some()
            || self.opens_count > 0
            || self.clicks_count > 0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::delivery_job::Entity")]
    DeliveryJobs,
}

impl Related<super::delivery_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
