//! # Data Models
//!
//! SeaORM entities for the notifier tables plus the small value types shared
//! across the dispatch pipeline.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod channel;
pub mod delivery_job;
pub mod event;
pub mod event_channel_setting;
pub mod notification;
pub mod preference;
pub mod rate_limit_counter;
pub mod setting;
pub mod template;

pub use channel::Entity as Channel;
pub use delivery_job::Entity as DeliveryJob;
pub use event::Entity as Event;
pub use event_channel_setting::Entity as EventChannelSetting;
pub use notification::Entity as Notification;
pub use preference::Entity as Preference;
pub use rate_limit_counter::Entity as RateLimitCounter;
pub use setting::Entity as Setting;
pub use template::Entity as Template;

/// Delivery medium supported by the notifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Slack,
    Discord,
    Sms,
    Push,
    Database,
}

impl ChannelType {
    pub const ALL: [ChannelType; 6] = [
        ChannelType::Email,
        ChannelType::Slack,
        ChannelType::Discord,
        ChannelType::Sms,
        ChannelType::Push,
        ChannelType::Database,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Slack => "slack",
            ChannelType::Discord => "discord",
            ChannelType::Sms => "sms",
            ChannelType::Push => "push",
            ChannelType::Database => "database",
        }
    }

    /// Human readable title used when seeding channel rows.
    pub fn default_title(&self) -> &'static str {
        match self {
            ChannelType::Email => "Email",
            ChannelType::Slack => "Slack",
            ChannelType::Discord => "Discord",
            ChannelType::Sms => "SMS",
            ChannelType::Push => "Push Notification",
            ChannelType::Database => "In-App",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known channel type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel type '{0}'")]
pub struct UnknownChannelType(pub String);

impl FromStr for ChannelType {
    type Err = UnknownChannelType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" | "mail" => Ok(ChannelType::Email),
            "slack" => Ok(ChannelType::Slack),
            "discord" => Ok(ChannelType::Discord),
            "sms" => Ok(ChannelType::Sms),
            "push" => Ok(ChannelType::Push),
            "database" => Ok(ChannelType::Database),
            _ => Err(UnknownChannelType(value.to_string())),
        }
    }
}

/// Per-channel opt-in flags for one (user, event) pair.
pub type ChannelPreferences = BTreeMap<ChannelType, bool>;

/// Lifecycle state of a notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status '{other}'")),
        }
    }
}

/// Address book snapshot of the user a notification is for.
///
/// Users live in the host application, so the fields a transport needs are
/// captured at dispatch time and stored alongside the notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Recipient {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

impl Recipient {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }
}

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "notifier".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_parses_case_insensitively() {
        assert_eq!("Email".parse::<ChannelType>().unwrap(), ChannelType::Email);
        assert_eq!(" sms ".parse::<ChannelType>().unwrap(), ChannelType::Sms);
        assert!("fax".parse::<ChannelType>().is_err());
    }

    #[test]
    fn channel_preferences_serialize_as_string_keys() {
        let prefs = ChannelPreferences::from([(ChannelType::Email, true), (ChannelType::Sms, false)]);
        let json = serde_json::to_value(&prefs).unwrap();
        assert_eq!(json, serde_json::json!({"email": true, "sms": false}));

        let back: ChannelPreferences = serde_json::from_value(json).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn recipient_omits_absent_fields() {
        let recipient = Recipient::new(7).with_email("a@b.com");
        let json = serde_json::to_value(&recipient).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "email": "a@b.com"}));
    }
}
