//! SMTP email transport.
//!
//! The SMTP connection is built from the channel settings on each send.
//! Without `smtp_host` mail goes to an unencrypted relay on localhost:25.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use regex::Regex;

use super::{ChannelTransport, DeliveryEnvelope, TransportError, is_present};
use crate::models::ChannelType;
use crate::tracking;

pub const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_NAME: &str = "Notification";
const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is a valid regex"))
}

/// Content counts as HTML when stripping tags changes it.
pub fn is_html(content: &str) -> bool {
    tag_pattern().is_match(content)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encryption {
    /// STARTTLS upgrade
    Tls,
    /// Implicit TLS
    Ssl,
    None,
}

impl Encryption {
    fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("ssl") => Encryption::Ssl,
            Some("none") | Some("") => Encryption::None,
            _ => Encryption::Tls,
        }
    }
}

#[derive(Default)]
pub struct EmailTransport;

impl EmailTransport {
    pub fn new() -> Self {
        Self
    }

    /// Build the MIME message for `envelope`, appending the open pixel when enabled.
    pub fn build_message(envelope: &DeliveryEnvelope) -> Result<Message, TransportError> {
        let to_address = envelope
            .recipient
            .email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or(TransportError::MissingAddress {
                user_id: envelope.recipient.id,
                field: "email address",
            })?;
        let to = Mailbox::new(
            envelope.recipient.name.clone(),
            parse_address(to_address, "recipient")?,
        );
        let from = Mailbox::new(
            Some(
                envelope
                    .setting("from_name")
                    .unwrap_or(DEFAULT_FROM_NAME)
                    .to_string(),
            ),
            parse_address(envelope.require_setting("from_address")?, "from_address")?,
        );

        let mut body = envelope.content.clone();
        if envelope.open_tracking
            && let Some(token) = envelope.tracking_token.as_deref()
        {
            body.push_str(&tracking::pixel_html(&envelope.app_url, token));
        }
        let content_type = if is_html(&body) {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(envelope.subject.clone())
            .header(content_type)
            .body(body)
            .map_err(|err| TransportError::Configuration(format!("Invalid email message: {err}")))
    }

    fn smtp_transport(
        envelope: &DeliveryEnvelope,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let Some(host) = envelope.setting("smtp_host") else {
            return Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost")
                .port(25)
                .timeout(Some(SMTP_TIMEOUT))
                .build());
        };

        let port = match envelope.setting("smtp_port") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| {
                TransportError::Configuration(format!("Invalid smtp_port '{value}'"))
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        let builder = match Encryption::from_setting(envelope.setting("smtp_encryption")) {
            Encryption::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            Encryption::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|err| TransportError::Configuration(format!("Invalid SMTP relay: {err}")))?;

        let mut builder = builder.port(port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(username), Some(password)) = (
            envelope.setting("smtp_username"),
            envelope.setting("smtp_password"),
        ) {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        Ok(builder.build())
    }
}

fn parse_address(value: &str, field: &str) -> Result<Address, TransportError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|err| TransportError::Configuration(format!("Invalid {field} '{value}': {err}")))
}

#[async_trait]
impl ChannelTransport for EmailTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        let message = Self::build_message(envelope)?;
        let transport = Self::smtp_transport(envelope)?;

        transport
            .send(message)
            .await
            .map_err(|err| TransportError::Smtp {
                permanent: err.is_permanent(),
                message: err.to_string(),
            })?;

        tracing::debug!(
            notification_id = %envelope.notification_id,
            user_id = envelope.recipient.id,
            "Email handed to SMTP relay"
        );
        Ok(true)
    }

    fn validate_settings(&self, settings: &HashMap<String, String>) -> bool {
        is_present(settings, "from_address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recipient;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope(content: &str) -> DeliveryEnvelope {
        DeliveryEnvelope {
            notification_id: Uuid::new_v4(),
            tenant_id: None,
            channel: ChannelType::Email,
            recipient: Recipient::new(7)
                .with_name("Ada")
                .with_email("ada@example.com"),
            subject: "Welcome".to_string(),
            content: content.to_string(),
            data: json!({}),
            tracking_token: Some("tok".to_string()),
            settings: HashMap::from([
                ("from_address".to_string(), "noreply@example.com".to_string()),
                ("from_name".to_string(), "Notifier".to_string()),
            ]),
            open_tracking: false,
            app_url: "https://app.test".to_string(),
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).into_owned()
    }

    #[test]
    fn detects_html_bodies() {
        assert!(is_html("<p>Hello</p>"));
        assert!(!is_html("Hello there"));
    }

    #[test]
    fn plain_text_without_tracking() {
        let message = EmailTransport::build_message(&envelope("Hello there")).unwrap();
        let raw = formatted(&message);
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("To: \"Ada\" <ada@example.com>") || raw.contains("To: Ada <ada@example.com>"));
        assert!(!raw.contains("/track/open/"));
    }

    #[test]
    fn appends_pixel_when_open_tracking() {
        let mut env = envelope("Hello there");
        env.open_tracking = true;
        let raw = formatted(&EmailTransport::build_message(&env).unwrap());
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("/track/open/tok"));
    }

    #[test]
    fn missing_recipient_email_is_permanent() {
        let mut env = envelope("x");
        env.recipient.email = None;
        let err = EmailTransport::build_message(&env).unwrap_err();
        assert!(matches!(err, TransportError::MissingAddress { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_from_address_is_configuration_error() {
        let mut env = envelope("x");
        env.settings.clear();
        let err = EmailTransport::build_message(&env).unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));
        assert!(!EmailTransport::new().validate_settings(&env.settings));
    }
}
