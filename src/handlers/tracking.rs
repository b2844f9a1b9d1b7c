//! # Tracking Handlers
//!
//! Public open-pixel and click-redirect endpoints. Neither ever fails
//! visibly: the pixel is served and the redirect issued whatever the token.

use axum::{
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LOCATION, PRAGMA},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::server::AppState;
use crate::tracking::TRANSPARENT_PIXEL_PNG;

#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct ClickQuery {
    /// Destination the tracked link pointed at
    pub url: Option<String>,
}

/// Record an email open and serve a 1x1 transparent PNG
#[utoipa::path(
    get,
    path = "/track/open/{token}",
    params(("token" = String, Path, description = "Tracking token")),
    responses(
        (status = 200, description = "Transparent pixel", content_type = "image/png")
    ),
    tag = "tracking"
)]
pub async fn track_open(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    if let Err(err) = state.analytics.track_open(&token).await {
        tracing::error!(error = %err, "Failed to record open");
    }

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "image/png"),
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (PRAGMA, "no-cache"),
            (EXPIRES, "0"),
        ],
        TRANSPARENT_PIXEL_PNG,
    )
        .into_response()
}

/// Record a click and redirect to the validated destination
#[utoipa::path(
    get,
    path = "/track/click/{token}",
    params(("token" = String, Path, description = "Tracking token"), ClickQuery),
    responses(
        (status = 302, description = "Redirect to the destination, or `/` when it is unsafe")
    ),
    tag = "tracking"
)]
pub async fn track_click(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<ClickQuery>,
) -> Response {
    let target = state
        .analytics
        .track_click(&token, query.url.as_deref())
        .await;
    let location = HeaderValue::from_str(&target).unwrap_or_else(|_| HeaderValue::from_static("/"));

    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}
