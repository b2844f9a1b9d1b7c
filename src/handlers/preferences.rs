//! # Preferences API Handlers
//!
//! Self-service endpoints for the user named by `X-User-Id`: read the
//! resolved channel flags per event and store explicit overrides.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::auth::{AuthenticatedUser, TenantHeader, UserHeader};
use crate::error::{ApiError, forbidden, not_found, unprocessable};
use crate::events::Event;
use crate::models::ChannelPreferences;
use crate::preferences::PreferenceUpdateError;
use crate::server::AppState;

/// Resolved preference for one event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventPreference {
    pub event_key: String,
    pub event_name: String,
    pub group: String,
    pub description: Option<String>,
    /// Channel type to enabled flag
    pub channels: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreferenceListResponse {
    pub data: Vec<EventPreference>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreferenceResponse {
    pub data: EventPreference,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailableEvent {
    pub key: String,
    pub name: String,
    pub group: String,
    pub description: Option<String>,
    pub default_channels: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailableChannel {
    #[serde(rename = "type")]
    pub channel_type: String,
    pub title: String,
    pub icon: Option<String>,
}

/// Catalog for building a preferences UI
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailableResponse {
    pub events: Vec<AvailableEvent>,
    pub channels: Vec<AvailableChannel>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePreferenceRequest {
    /// Channel type to enabled flag; every key must be an active channel
    pub channels: BTreeMap<String, bool>,
    /// Free-form per-user settings stored with the preference
    #[serde(default)]
    pub settings: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatedPreference {
    pub event_key: String,
    pub event_name: String,
    pub channels: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePreferenceResponse {
    pub data: UpdatedPreference,
    pub message: String,
}

fn channel_flags(channels: ChannelPreferences) -> BTreeMap<String, bool> {
    channels
        .into_iter()
        .map(|(channel, enabled)| (channel.as_str().to_string(), enabled))
        .collect()
}

async fn resolve(
    state: &AppState,
    user_id: i64,
    event: Event,
) -> Result<EventPreference, ApiError> {
    let channels = state
        .preferences
        .channels_for_display(user_id, &event.key)
        .await?;

    Ok(EventPreference {
        event_key: event.key,
        event_name: event.name,
        group: event.group,
        description: event.description,
        channels: channel_flags(channels),
    })
}

/// Resolved preferences for every active event
#[utoipa::path(
    get,
    path = "/preferences",
    security(("bearer_auth" = [])),
    params(TenantHeader, UserHeader),
    responses(
        (status = 200, description = "Resolved preferences", body = PreferenceListResponse, example = json!({
            "data": [
                {
                    "event_key": "user.registered",
                    "event_name": "User Registered",
                    "group": "Users",
                    "description": null,
                    "channels": {"email": true, "slack": false}
                }
            ]
        })),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "preferences"
)]
pub async fn list_preferences(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<PreferenceListResponse>, ApiError> {
    let mut data = Vec::new();
    for event in state.events.all().await?.into_values() {
        if !event.active {
            continue;
        }
        data.push(resolve(&state, user_id, event).await?);
    }

    Ok(Json(PreferenceListResponse { data }))
}

/// Active events, ordered by group, and the channels a user can choose from
#[utoipa::path(
    get,
    path = "/preferences/available",
    security(("bearer_auth" = [])),
    params(TenantHeader, UserHeader),
    responses(
        (status = 200, description = "Event and channel catalog", body = AvailableResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "preferences"
)]
pub async fn available(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
) -> Result<Json<AvailableResponse>, ApiError> {
    let events = state
        .events
        .grouped()
        .await?
        .into_values()
        .flatten()
        .filter(|event| event.active)
        .map(|event| AvailableEvent {
            key: event.key,
            name: event.name,
            group: event.group,
            description: event.description,
            default_channels: event
                .default_channels
                .iter()
                .map(|channel| channel.as_str().to_string())
                .collect(),
        })
        .collect();

    let channels = state
        .channels
        .active_channels()
        .await?
        .into_iter()
        .map(|channel| AvailableChannel {
            channel_type: channel.channel_type.as_str().to_string(),
            title: channel.title,
            icon: channel.icon,
        })
        .collect();

    Ok(Json(AvailableResponse { events, channels }))
}

/// Resolved preference for a single event
#[utoipa::path(
    get,
    path = "/preferences/{event_key}",
    security(("bearer_auth" = [])),
    params(
        TenantHeader,
        UserHeader,
        ("event_key" = String, Path, description = "Event key, e.g. user.registered")
    ),
    responses(
        (status = 200, description = "Resolved preference", body = PreferenceResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown or inactive event", body = ApiError)
    ),
    tag = "preferences"
)]
pub async fn get_preference(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(event_key): Path<String>,
) -> Result<Json<PreferenceResponse>, ApiError> {
    let event = state
        .events
        .get(&event_key)
        .await?
        .filter(|event| event.active)
        .ok_or_else(|| not_found(&format!("Event '{event_key}' not found.")))?;

    let data = resolve(&state, user_id, event).await?;
    Ok(Json(PreferenceResponse { data }))
}

/// Store explicit channel flags for an event
#[utoipa::path(
    put,
    path = "/preferences/{event_key}",
    security(("bearer_auth" = [])),
    params(
        TenantHeader,
        UserHeader,
        ("event_key" = String, Path, description = "Event key, e.g. user.registered")
    ),
    request_body = UpdatePreferenceRequest,
    responses(
        (status = 200, description = "Preference stored", body = UpdatePreferenceResponse, example = json!({
            "data": {
                "event_key": "user.registered",
                "event_name": "User Registered",
                "channels": {"email": false, "slack": true}
            },
            "message": "Preferences updated successfully."
        })),
        (status = 400, description = "Malformed body", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Overrides disabled by administrator", body = ApiError),
        (status = 404, description = "Unknown or inactive event", body = ApiError),
        (status = 422, description = "Unknown or inactive channel", body = ApiError)
    ),
    tag = "preferences"
)]
pub async fn update_preference(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(event_key): Path<String>,
    payload: Result<Json<UpdatePreferenceRequest>, JsonRejection>,
) -> Result<Json<UpdatePreferenceResponse>, ApiError> {
    let Json(request) = payload?;

    let (event, channels) = state
        .preferences
        .update(user_id, &event_key, &request.channels, request.settings)
        .await
        .map_err(|err| match err {
            PreferenceUpdateError::OverrideDisabled => forbidden(Some(&err.to_string())),
            PreferenceUpdateError::EventNotFound(_) => not_found(&err.to_string()),
            PreferenceUpdateError::UnknownChannel(_) => unprocessable(&err.to_string()),
            PreferenceUpdateError::Repository(inner) => inner.into(),
        })?;

    Ok(Json(UpdatePreferenceResponse {
        data: UpdatedPreference {
            event_key: event.key,
            event_name: event.name,
            channels: channel_flags(channels),
        },
        message: "Preferences updated successfully.".to_string(),
    }))
}
