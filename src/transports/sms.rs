//! SMS transport.
//!
//! Uses Twilio when account credentials are configured, otherwise a generic
//! REST endpoint taking `{to, message}` with a bearer `api_key`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ChannelTransport, DeliveryEnvelope, TransportError, is_present, send_checked};
use crate::models::ChannelType;

pub const DEFAULT_TWILIO_BASE_URL: &str = "https://api.twilio.com";

pub struct SmsTransport {
    client: Client,
}

impl SmsTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send_via_twilio(
        &self,
        envelope: &DeliveryEnvelope,
        phone: &str,
        account_sid: &str,
        auth_token: &str,
    ) -> Result<(), TransportError> {
        let from = envelope.require_setting("twilio_phone_number")?;
        let base_url = envelope
            .setting("twilio_base_url")
            .unwrap_or(DEFAULT_TWILIO_BASE_URL)
            .trim_end_matches('/');
        let url = format!("{base_url}/2010-04-01/Accounts/{account_sid}/Messages.json");

        let form = [
            ("To", phone),
            ("From", from),
            ("Body", envelope.content.as_str()),
        ];
        send_checked(
            self.client
                .post(url)
                .basic_auth(account_sid, Some(auth_token))
                .form(&form),
        )
        .await?;
        Ok(())
    }

    async fn send_via_api(
        &self,
        envelope: &DeliveryEnvelope,
        phone: &str,
    ) -> Result<(), TransportError> {
        let api_url = envelope.require_setting("api_url")?;
        let api_key = envelope.require_setting("api_key")?;

        send_checked(
            self.client
                .post(api_url)
                .bearer_auth(api_key)
                .json(&json!({"to": phone, "message": envelope.content})),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelTransport for SmsTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Sms
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        let phone = envelope
            .recipient
            .phone
            .as_deref()
            .filter(|phone| !phone.trim().is_empty())
            .ok_or(TransportError::MissingAddress {
                user_id: envelope.recipient.id,
                field: "phone number",
            })?;

        match (
            envelope.setting("twilio_account_sid"),
            envelope.setting("twilio_auth_token"),
        ) {
            (Some(sid), Some(token)) => self.send_via_twilio(envelope, phone, sid, token).await?,
            _ => self.send_via_api(envelope, phone).await?,
        }
        Ok(true)
    }

    fn validate_settings(&self, settings: &HashMap<String, String>) -> bool {
        let twilio = ["twilio_account_sid", "twilio_auth_token", "twilio_phone_number"]
            .iter()
            .all(|key| is_present(settings, key));
        let generic = is_present(settings, "api_url") && is_present(settings, "api_key");
        twilio || generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_either_provider() {
        let transport = SmsTransport::new(Client::new());
        let mut settings = HashMap::new();
        assert!(!transport.validate_settings(&settings));

        settings.insert("api_url".to_string(), "https://sms.test".to_string());
        assert!(!transport.validate_settings(&settings));
        settings.insert("api_key".to_string(), "k".to_string());
        assert!(transport.validate_settings(&settings));

        let twilio: HashMap<String, String> = [
            ("twilio_account_sid", "AC1"),
            ("twilio_auth_token", "t"),
            ("twilio_phone_number", "+15550000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert!(transport.validate_settings(&twilio));
    }
}
