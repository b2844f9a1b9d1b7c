//! Discord webhook transport.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;

use super::{ChannelTransport, DeliveryEnvelope, TransportError, is_present, send_checked};
use crate::models::ChannelType;

/// Embed colour used when the channel does not set `color`.
pub const DEFAULT_EMBED_COLOR: u32 = 3_447_003;

pub struct DiscordTransport {
    client: Client,
}

impl DiscordTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelTransport for DiscordTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Discord
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        let webhook_url = envelope.require_setting("webhook_url")?;
        let color = envelope
            .setting("color")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_EMBED_COLOR);

        let mut payload = json!({
            "content": envelope.subject,
            "embeds": [
                {
                    "title": envelope.subject,
                    "description": envelope.content,
                    "color": color,
                    "timestamp": Utc::now().to_rfc3339(),
                }
            ],
        });
        for key in ["username", "avatar_url"] {
            if let Some(value) = envelope.setting(key) {
                payload[key] = json!(value);
            }
        }

        send_checked(self.client.post(webhook_url).json(&payload)).await?;
        Ok(true)
    }

    fn validate_settings(&self, settings: &HashMap<String, String>) -> bool {
        is_present(settings, "webhook_url")
    }
}
