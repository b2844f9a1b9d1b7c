//! Provider transports against wiremock servers.

use std::collections::HashMap;

use notifier::models::{ChannelType, Recipient};
use notifier::transports::{
    ChannelTransport, DeliveryEnvelope, DiscordTransport, PushTransport, SlackTransport,
    SmsTransport, TransportError,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{
    basic_auth, bearer_token, body_partial_json, body_string_contains, header, method, path,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn envelope(
    channel: ChannelType,
    recipient: Recipient,
    settings: &[(&str, String)],
) -> DeliveryEnvelope {
    DeliveryEnvelope {
        notification_id: Uuid::new_v4(),
        tenant_id: None,
        channel,
        recipient,
        subject: "Build finished".to_string(),
        content: "All green".to_string(),
        data: json!({"build": 42}),
        tracking_token: None,
        settings: settings
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<HashMap<_, _>>(),
        open_tracking: false,
        app_url: "https://notify.test".to_string(),
    }
}

#[tokio::test]
async fn discord_posts_embed_with_default_color() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .and(body_partial_json(json!({
            "content": "Build finished",
            "username": "notifier-bot",
            "embeds": [{"title": "Build finished", "description": "All green", "color": 3447003}]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = DiscordTransport::new(reqwest::Client::new());
    let envelope = envelope(
        ChannelType::Discord,
        Recipient::new(1),
        &[
            ("webhook_url", format!("{}/discord", server.uri())),
            ("username", "notifier-bot".to_string()),
        ],
    );

    assert!(transport.send(&envelope).await.unwrap());
}

#[tokio::test]
async fn discord_without_webhook_is_a_configuration_error() {
    let transport = DiscordTransport::new(reqwest::Client::new());
    let err = transport
        .send(&envelope(ChannelType::Discord, Recipient::new(1), &[]))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Configuration(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn sms_prefers_twilio_when_credentials_are_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(basic_auth("AC123", "secret"))
        .and(body_string_contains("To=%2B15551234567"))
        .and(body_string_contains("From=%2B15550000000"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM1"})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = SmsTransport::new(reqwest::Client::new());
    let envelope = envelope(
        ChannelType::Sms,
        Recipient::new(5).with_phone("+15551234567"),
        &[
            ("twilio_account_sid", "AC123".to_string()),
            ("twilio_auth_token", "secret".to_string()),
            ("twilio_phone_number", "+15550000000".to_string()),
            ("twilio_base_url", server.uri()),
        ],
    );

    assert!(transport.send(&envelope).await.unwrap());
}

#[tokio::test]
async fn sms_falls_back_to_generic_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sms"))
        .and(bearer_token("api-key"))
        .and(body_partial_json(json!({"to": "+15551234567", "message": "All green"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = SmsTransport::new(reqwest::Client::new());
    let envelope = envelope(
        ChannelType::Sms,
        Recipient::new(5).with_phone("+15551234567"),
        &[
            ("api_url", format!("{}/sms", server.uri())),
            ("api_key", "api-key".to_string()),
        ],
    );

    assert!(transport.send(&envelope).await.unwrap());
}

#[tokio::test]
async fn sms_requires_a_phone_number() {
    let transport = SmsTransport::new(reqwest::Client::new());
    let err = transport
        .send(&envelope(
            ChannelType::Sms,
            Recipient::new(5),
            &[
                ("api_url", "http://127.0.0.1:9/sms".to_string()),
                ("api_key", "k".to_string()),
            ],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::MissingAddress { user_id: 5, .. }));
}

#[tokio::test]
async fn push_reports_fcm_failures_as_declined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fcm/ok"))
        .and(header("authorization", "key=server-key"))
        .and(body_partial_json(json!({
            "to": "device-1",
            "notification": {"title": "Build finished", "body": "All green"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1, "failure": 0})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fcm/rejected"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 0, "failure": 1})))
        .mount(&server)
        .await;

    let transport = PushTransport::new(reqwest::Client::new());
    let recipient = Recipient::new(8).with_push_token("device-1");

    let accepted = envelope(
        ChannelType::Push,
        recipient.clone(),
        &[
            ("firebase_server_key", "server-key".to_string()),
            ("fcm_endpoint", format!("{}/fcm/ok", server.uri())),
        ],
    );
    assert!(transport.send(&accepted).await.unwrap());

    let rejected = envelope(
        ChannelType::Push,
        recipient,
        &[
            ("firebase_server_key", "server-key".to_string()),
            ("fcm_endpoint", format!("{}/fcm/rejected", server.uri())),
        ],
    );
    assert!(!transport.send(&rejected).await.unwrap());
}

#[tokio::test]
async fn slack_server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/slack-gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
        .mount(&server)
        .await;

    let transport = SlackTransport::new(reqwest::Client::new());

    let err = transport
        .send(&envelope(
            ChannelType::Slack,
            Recipient::new(1),
            &[("webhook_url", format!("{}/slack", server.uri()))],
        ))
        .await
        .unwrap_err();
    match &err {
        TransportError::Http { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "internal");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());

    let gone = transport
        .send(&envelope(
            ChannelType::Slack,
            Recipient::new(1),
            &[("webhook_url", format!("{}/slack-gone", server.uri()))],
        ))
        .await
        .unwrap_err();
    assert!(!gone.is_retryable());
}
