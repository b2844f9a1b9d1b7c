//! Integration tests for the delivery worker: success, retry with backoff,
//! exhaustion, permanent failures and provider webhooks.

use anyhow::Result;
use async_trait::async_trait;
use notifier::models::{ChannelType, NotificationStatus, Recipient, delivery_job};
use notifier::repositories::{DeliveryJobRepository, NotificationRepository};
use notifier::server::AppState;
use notifier::transports::{
    ChannelTransport, DeliveryEnvelope, SlackTransport, TransportError, TransportRegistry,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

/// Email transport answering from a script; the last answer repeats.
struct ScriptedTransport {
    answers: Mutex<VecDeque<Result<bool, TransportError>>>,
    calls: Mutex<Vec<DeliveryEnvelope>>,
}

impl ScriptedTransport {
    fn new(answers: Vec<Result<bool, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelTransport for ScriptedTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    async fn send(&self, envelope: &DeliveryEnvelope) -> Result<bool, TransportError> {
        self.calls.lock().unwrap().push(envelope.clone());
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers.front().cloned().unwrap_or(Ok(true))
        }
    }

    fn validate_settings(&self, _settings: &HashMap<String, String>) -> bool {
        true
    }
}

fn registry(transport: Arc<ScriptedTransport>) -> Arc<TransportRegistry> {
    let mut registry = TransportRegistry::new();
    registry.register(transport);
    Arc::new(registry)
}

async fn dispatch_welcome(state: &AppState) -> Result<Uuid> {
    test_utils::seed_welcome_event(&state.db).await?;
    let ids = state
        .dispatcher
        .send(
            &Recipient::new(7).with_email("jane@example.com").with_name("Jane"),
            "user.registered",
            json!({"name": "Jane"}),
        )
        .await;
    assert_eq!(ids.len(), 1);
    Ok(ids[0])
}

async fn job_for(state: &AppState, notification_id: Uuid) -> Result<delivery_job::Model> {
    let mut jobs = DeliveryJobRepository::new(&state.db)
        .list_for_notification(notification_id)
        .await?;
    assert_eq!(jobs.len(), 1);
    Ok(jobs.remove(0))
}

#[tokio::test]
async fn successful_delivery_marks_notification_sent() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;
    let transport = ScriptedTransport::new(vec![Ok(true)]);

    let processed = state.delivery_worker(registry(transport.clone())).drain().await?;
    assert_eq!(processed, 1);
    assert_eq!(transport.call_count(), 1);

    let envelope = transport.calls.lock().unwrap()[0].clone();
    assert_eq!(envelope.recipient.email.as_deref(), Some("jane@example.com"));
    assert_eq!(envelope.subject, "Welcome to Test, Jane!");
    assert!(envelope.open_tracking);
    assert_eq!(envelope.app_url, "https://notify.test");

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification exists");
    assert_eq!(notification.status(), Some(NotificationStatus::Sent));
    assert!(notification.sent_at.is_some());

    let job = job_for(&state, id).await?;
    assert_eq!(job.status, delivery_job::status::SUCCEEDED);
    assert_eq!(job.attempts, 1);
    Ok(())
}

#[tokio::test]
async fn transient_failure_is_retried_until_delivered() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;
    let transport = ScriptedTransport::new(vec![
        Err(TransportError::Network("connection reset".into())),
        Ok(true),
    ]);

    state.delivery_worker(registry(transport.clone())).drain().await?;
    assert_eq!(transport.call_count(), 2);

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification exists");
    assert_eq!(notification.status(), Some(NotificationStatus::Sent));
    assert_eq!(notification.error, None);

    let job = job_for(&state, id).await?;
    assert_eq!(job.status, delivery_job::status::SUCCEEDED);
    assert_eq!(job.attempts, 2);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_leave_notification_failed() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;
    let transport = ScriptedTransport::new(vec![Err(TransportError::Http {
        status: 503,
        body: "unavailable".into(),
    })]);

    state.delivery_worker(registry(transport.clone())).drain().await?;
    assert_eq!(transport.call_count(), 3);

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification exists");
    assert_eq!(notification.status(), Some(NotificationStatus::Failed));
    assert!(notification.error.unwrap_or_default().contains("503"));

    let job = job_for(&state, id).await?;
    assert_eq!(job.status, delivery_job::status::FAILED);
    assert_eq!(job.attempts, 3);
    Ok(())
}

#[tokio::test]
async fn provider_rejection_counts_as_failed_attempt() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;
    let transport = ScriptedTransport::new(vec![Ok(false), Ok(true)]);

    state.delivery_worker(registry(transport.clone())).drain().await?;
    assert_eq!(transport.call_count(), 2);
    assert_eq!(job_for(&state, id).await?.status, delivery_job::status::SUCCEEDED);
    Ok(())
}

#[tokio::test]
async fn permanent_failure_is_not_retried() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;
    let transport = ScriptedTransport::new(vec![Err(TransportError::MissingAddress {
        user_id: 7,
        field: "email address",
    })]);

    state.delivery_worker(registry(transport.clone())).drain().await?;
    assert_eq!(transport.call_count(), 1);

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification exists");
    assert_eq!(notification.status(), Some(NotificationStatus::Failed));
    assert_eq!(job_for(&state, id).await?.status, delivery_job::status::FAILED);
    Ok(())
}

#[tokio::test]
async fn missing_transport_fails_without_retry() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;

    state
        .delivery_worker(Arc::new(TransportRegistry::new()))
        .drain()
        .await?;

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification exists");
    assert_eq!(notification.status(), Some(NotificationStatus::Failed));
    assert!(
        notification
            .error
            .unwrap_or_default()
            .contains("No transport registered")
    );
    assert_eq!(job_for(&state, id).await?.status, delivery_job::status::DISCARDED);
    Ok(())
}

#[tokio::test]
async fn already_sent_notifications_are_not_delivered_twice() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let id = dispatch_welcome(&state).await?;
    NotificationRepository::new(&state.db).mark_sent(id).await?;
    let transport = ScriptedTransport::new(vec![Ok(true)]);

    state.delivery_worker(registry(transport.clone())).drain().await?;

    assert_eq!(transport.call_count(), 0);
    assert_eq!(job_for(&state, id).await?.status, delivery_job::status::SUCCEEDED);
    Ok(())
}

#[tokio::test]
async fn slack_webhook_receives_rendered_message() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/notify"))
        .and(body_partial_json(json!({"text": "Welcome to Test, Jane!"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let state = test_utils::setup_state(test_utils::test_config()).await?;
    test_utils::seed_welcome_event(&state.db).await?;
    test_utils::upsert_channel(
        &state.db,
        None,
        ChannelType::Slack,
        true,
        Some(json!({"webhook_url": format!("{}/hooks/notify", server.uri())})),
    )
    .await?;

    let id = state
        .dispatcher
        .send_to_channel(
            &Recipient::new(7).with_name("Jane"),
            "user.registered",
            ChannelType::Slack,
            json!({"name": "Jane"}),
        )
        .await
        .expect("slack notification queued");

    let mut transports = TransportRegistry::new();
    transports.register(Arc::new(SlackTransport::new(reqwest::Client::new())));
    state.delivery_worker(Arc::new(transports)).drain().await?;

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification exists");
    assert_eq!(notification.status(), Some(NotificationStatus::Sent));
    // Click rewriting is email-only
    assert!(!notification.content.contains("/track/click/"));
    Ok(())
}
