//! # Tests for Handlers
//!
//! Unit tests for the handlers that need no database.

use crate::handlers::{health::healthz, root};
use axum::response::Json;

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "notifier");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_reports_ok() {
    let Json(health) = healthz().await;
    assert_eq!(health.status, "ok");
}

#[test]
fn test_openapi_lists_every_route() {
    use utoipa::OpenApi;

    let doc = crate::server::ApiDoc::openapi();
    for path in [
        "/",
        "/healthz",
        "/readyz",
        "/track/open/{token}",
        "/track/click/{token}",
        "/preferences",
        "/preferences/available",
        "/preferences/{event_key}",
        "/admin/notifications",
        "/admin/notifications/{id}/resend",
        "/admin/rate-limit",
        "/admin/events/{event_key}/channels",
        "/admin/channels/{channel_type}",
        "/admin/templates/{event_key}",
        "/admin/send-test",
    ] {
        assert!(doc.paths.paths.contains_key(path), "missing {path}");
    }
}
