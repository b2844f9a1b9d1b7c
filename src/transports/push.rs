//! Push transport over the FCM legacy HTTP API.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;

use super::{ChannelTransport, DeliveryEnvelope, TransportError, is_present, send_checked};
use crate::models::ChannelType;

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Debug, Default, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    failure: u64,
}

pub struct PushTransport {
    client: Client,
}

impl PushTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelTransport for PushTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Push
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        let server_key = envelope.require_setting("firebase_server_key")?;
        let device_token = envelope
            .recipient
            .push_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(TransportError::MissingAddress {
                user_id: envelope.recipient.id,
                field: "push token",
            })?;
        let endpoint = envelope
            .setting("fcm_endpoint")
            .unwrap_or(DEFAULT_FCM_ENDPOINT);

        let response = send_checked(
            self.client
                .post(endpoint)
                .header(AUTHORIZATION, format!("key={server_key}"))
                .json(&json!({
                    "to": device_token,
                    "notification": {
                        "title": envelope.subject,
                        "body": envelope.content,
                    },
                    "data": envelope.data,
                })),
        )
        .await?;

        // FCM answers 200 even when the device token was rejected.
        let body: FcmResponse = response.json().await.unwrap_or_default();
        if body.failure > 0 {
            tracing::warn!(
                notification_id = %envelope.notification_id,
                user_id = envelope.recipient.id,
                "FCM rejected the push message"
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn validate_settings(&self, settings: &HashMap<String, String>) -> bool {
        is_present(settings, "firebase_server_key") && is_present(settings, "firebase_project_id")
    }
}
