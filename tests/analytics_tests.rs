//! Integration tests for open/click analytics and the retention sweep.

use anyhow::Result;
use notifier::models::Recipient;
use notifier::repositories::NotificationRepository;
use notifier::server::AppState;
use serde_json::json;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

async fn dispatched(state: &AppState) -> Result<(Uuid, String)> {
    test_utils::seed_welcome_event(&state.db).await?;
    let ids = state
        .dispatcher
        .send(
            &Recipient::new(3).with_email("sam@example.com"),
            "user.registered",
            json!({"name": "Sam"}),
        )
        .await;
    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, ids[0])
        .await?
        .expect("notification stored");
    Ok((notification.id, notification.tracking_token))
}

#[tokio::test]
async fn repeated_opens_count_but_keep_first_timestamp() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let (id, token) = dispatched(&state).await?;
    let notifications = NotificationRepository::new(&state.db);

    assert!(state.analytics.track_open(&token).await?);
    let first = notifications
        .find_by_id(None, id)
        .await?
        .expect("notification")
        .opened_at
        .expect("opened_at set on first open");

    for _ in 0..3 {
        assert!(state.analytics.track_open(&token).await?);
    }

    let notification = notifications.find_by_id(None, id).await?.expect("notification");
    assert_eq!(notification.opens_count, 4);
    assert_eq!(notification.opened_at, Some(first));
    assert_eq!(notification.clicks_count, 0);
    Ok(())
}

#[tokio::test]
async fn unknown_tokens_record_nothing() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    assert!(!state.analytics.track_open("does-not-exist").await?);
    assert!(!state.analytics.track_open("").await?);
    assert_eq!(
        state
            .analytics
            .track_click("does-not-exist", Some("https://example.com/a"))
            .await,
        "https://example.com/a"
    );
    Ok(())
}

#[tokio::test]
async fn clicks_are_counted_and_unsafe_targets_redirect_home() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let (id, token) = dispatched(&state).await?;

    assert_eq!(
        state
            .analytics
            .track_click(&token, Some("https://example.com/start"))
            .await,
        "https://example.com/start"
    );
    assert_eq!(
        state
            .analytics
            .track_click(&token, Some("javascript:alert(1)"))
            .await,
        "/"
    );
    assert_eq!(
        state
            .analytics
            .track_click(&token, Some("data:text/html,<script>alert(1)</script>"))
            .await,
        "/"
    );
    assert_eq!(
        state.analytics.track_click(&token, Some("dashboard")).await,
        "/dashboard"
    );
    assert_eq!(
        state.analytics.track_click(&token, Some("\\evil.example")).await,
        "/"
    );

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification");
    assert_eq!(notification.clicks_count, 5);
    assert!(notification.clicked_at.is_some());
    Ok(())
}

#[tokio::test]
async fn clicks_without_a_target_are_not_counted() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let (id, token) = dispatched(&state).await?;

    assert_eq!(state.analytics.track_click(&token, None).await, "/");
    assert_eq!(state.analytics.track_click(&token, Some("")).await, "/");
    assert_eq!(state.analytics.track_click(&token, Some(" / ")).await, "/");

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification");
    assert_eq!(notification.clicks_count, 0);
    assert!(notification.clicked_at.is_none());
    Ok(())
}

#[tokio::test]
async fn disabled_open_tracking_is_a_noop() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let (id, token) = dispatched(&state).await?;
    state
        .settings
        .set("analytics", json!({"track_opens": false}), Some("analytics"))
        .await?;

    assert!(!state.analytics.track_open(&token).await?);
    assert_eq!(state.analytics.track_click(&token, Some("/x")).await, "/x");

    let notification = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification");
    assert_eq!(notification.opens_count, 0);
    assert_eq!(notification.clicks_count, 1);
    Ok(())
}

#[tokio::test]
async fn cleanup_clears_analytics_past_retention() -> Result<()> {
    let state = test_utils::setup_state(test_utils::test_config()).await?;
    let (id, token) = dispatched(&state).await?;
    state.analytics.track_open(&token).await?;
    state.analytics.track_click(&token, Some("/pricing")).await;

    // Inside the default 90 day window nothing qualifies
    assert_eq!(state.analytics.cleanup(true).await?, 0);

    state
        .settings
        .set("analytics", json!({"retention_days": 0}), Some("analytics"))
        .await?;
    assert_eq!(state.analytics.cleanup(true).await?, 1);

    let untouched = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification");
    assert_eq!(untouched.opens_count, 1);

    assert_eq!(state.analytics.cleanup(false).await?, 1);
    let cleared = NotificationRepository::new(&state.db)
        .find_by_id(None, id)
        .await?
        .expect("notification kept");
    assert_eq!(cleared.opens_count, 0);
    assert_eq!(cleared.clicks_count, 0);
    assert!(cleared.opened_at.is_none());
    assert!(cleared.clicked_at.is_none());

    assert_eq!(state.analytics.cleanup(false).await?, 0);
    Ok(())
}
