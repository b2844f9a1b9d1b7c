//! In-app delivery: the stored notification row is the message.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{ChannelTransport, DeliveryEnvelope, TransportError};
use crate::models::ChannelType;

pub struct DatabaseTransport;

#[async_trait]
impl ChannelTransport for DatabaseTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Database
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        tracing::debug!(
            notification_id = %envelope.notification_id,
            user_id = envelope.recipient.id,
            "Stored in-app notification"
        );
        Ok(true)
    }

    fn validate_settings(&self, _settings: &HashMap<String, String>) -> bool {
        true
    }
}
