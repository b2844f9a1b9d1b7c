//! Slack incoming-webhook transport.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ChannelTransport, DeliveryEnvelope, TransportError, is_present, send_checked};
use crate::models::ChannelType;

pub struct SlackTransport {
    client: Client,
}

impl SlackTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelTransport for SlackTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Slack
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        let webhook_url = envelope.require_setting("webhook_url")?;
        let payload = json!({
            "text": envelope.subject,
            "blocks": [
                {
                    "type": "section",
                    "text": {"type": "mrkdwn", "text": envelope.content},
                }
            ],
        });

        send_checked(self.client.post(webhook_url).json(&payload)).await?;
        Ok(true)
    }

    fn validate_settings(&self, settings: &HashMap<String, String>) -> bool {
        is_present(settings, "webhook_url")
    }
}
