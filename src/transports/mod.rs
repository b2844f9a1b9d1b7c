//! Channel transports
//!
//! One [`ChannelTransport`] per channel type, looked up through a
//! [`TransportRegistry`] populated at startup. Transports read their provider
//! configuration from the channel's `settings` map on every send, so a
//! settings change takes effect without a restart.

pub mod database;
pub mod discord;
pub mod email;
pub mod push;
pub mod slack;
pub mod sms;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChannelType, Recipient};

pub use database::DatabaseTransport;
pub use discord::DiscordTransport;
pub use email::EmailTransport;
pub use push::PushTransport;
pub use slack::SlackTransport;
pub use sms::SmsTransport;

const MAX_ERROR_BODY: usize = 512;

/// Delivery failure reported by a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Channel settings are missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The recipient has no address for this channel
    #[error("Recipient {user_id} has no {field}")]
    MissingAddress { user_id: i64, field: &'static str },
    /// Provider answered with a non-success status
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("SMTP error: {message}")]
    Smtp { message: String, permanent: bool },
    #[error("Delivery attempt timed out after {0}s")]
    Timeout(u64),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Configuration(_) | TransportError::MissingAddress { .. } => false,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::Network(_) | TransportError::Timeout(_) => true,
            TransportError::Smtp { permanent, .. } => !permanent,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::Configuration(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Everything a transport needs to deliver one notification.
#[derive(Debug, Clone)]
pub struct DeliveryEnvelope {
    pub notification_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub channel: ChannelType,
    pub recipient: Recipient,
    pub subject: String,
    pub content: String,
    pub data: JsonValue,
    pub tracking_token: Option<String>,
    /// Settings of the channel row
    pub settings: HashMap<String, String>,
    /// Append the open-tracking pixel to email bodies
    pub open_tracking: bool,
    pub app_url: String,
}

impl DeliveryEnvelope {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn require_setting(&self, key: &str) -> Result<&str, TransportError> {
        self.setting(key).ok_or_else(|| {
            TransportError::Configuration(format!(
                "{} channel is missing '{key}'",
                self.channel
            ))
        })
    }
}

/// Sends a rendered notification through one provider.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// `Ok(true)` when the provider accepted the message, `Ok(false)` when it
    /// answered but declined it.
    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError>;

    /// Whether `settings` carry what this transport needs.
    fn validate_settings(&self, settings: &HashMap<String, String>) -> bool;
}

/// Channel type to transport lookup.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<ChannelType, Arc<dyn ChannelTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a transport for every built-in channel type.
    pub fn with_defaults() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("notifier/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut registry = Self::new();
        registry.register(Arc::new(EmailTransport::new()));
        registry.register(Arc::new(SlackTransport::new(client.clone())));
        registry.register(Arc::new(DiscordTransport::new(client.clone())));
        registry.register(Arc::new(SmsTransport::new(client.clone())));
        registry.register(Arc::new(PushTransport::new(client)));
        registry.register(Arc::new(DatabaseTransport));
        Ok(registry)
    }

    /// Add or replace the transport for its channel type.
    pub fn register(&mut self, transport: Arc<dyn ChannelTransport>) {
        self.transports.insert(transport.channel_type(), transport);
    }

    pub fn get(&self, channel_type: ChannelType) -> Option<Arc<dyn ChannelTransport>> {
        self.transports.get(&channel_type).cloned()
    }

    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut types: Vec<_> = self.transports.keys().copied().collect();
        types.sort();
        types
    }
}

fn is_present(settings: &HashMap<String, String>, key: &str) -> bool {
    settings
        .get(key)
        .is_some_and(|value| !value.trim().is_empty())
}

/// Send `request`, turning transport failures and non-2xx answers into errors.
async fn send_checked(request: RequestBuilder) -> Result<Response, TransportError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(TransportError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_errors() {
        assert!(!TransportError::Configuration("x".into()).is_retryable());
        assert!(
            !TransportError::MissingAddress {
                user_id: 1,
                field: "email"
            }
            .is_retryable()
        );
        assert!(
            TransportError::Http {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            TransportError::Http {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !TransportError::Http {
                status: 404,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(TransportError::Timeout(30).is_retryable());
        assert!(
            !TransportError::Smtp {
                message: "550".into(),
                permanent: true
            }
            .is_retryable()
        );
    }

    #[test]
    fn default_registry_covers_every_channel() {
        let registry = TransportRegistry::with_defaults().unwrap();
        assert_eq!(registry.channel_types(), ChannelType::ALL.to_vec());
        for channel in ChannelType::ALL {
            assert_eq!(registry.get(channel).unwrap().channel_type(), channel);
        }
    }
}
