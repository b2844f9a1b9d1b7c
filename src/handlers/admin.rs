//! # Admin API Handlers
//!
//! Operator endpoints: browse and resend notifications, inspect the rate
//! limiter, configure channels, templates and per-event default channels,
//! and fire a test send. Every change applies to the request's tenant.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::channels::Channel;
use crate::dispatch::DispatchError;
use crate::error::{ApiError, not_found, unprocessable, validation_error};
use crate::events::Event;
use crate::models::channel::flatten_settings;
use crate::models::{ChannelType, NotificationStatus, Recipient, notification, template};
use crate::rate_limit::RateLimitStatus;
use crate::repositories::{
    NewTemplate, NotificationFilter, NotificationRepository, TemplateRepository,
};
use crate::server::AppState;

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Query parameters for notification listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct ListNotificationsQuery {
    /// pending, sent or failed
    pub status: Option<String>,
    /// Channel type, e.g. "email"
    pub channel: Option<String>,
    /// Only notifications for this user
    pub user_id: Option<i64>,
    /// 1-based page number (default: 1)
    pub page: Option<u64>,
    /// Page size (default: 20, max: 100)
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationSummary {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub user_id: i64,
    pub channel: String,
    pub subject: String,
    pub status: String,
    pub error: Option<String>,
    pub opens_count: i32,
    pub clicks_count: i32,
    pub scheduled_at: Option<String>,
    pub sent_at: Option<String>,
    pub opened_at: Option<String>,
    pub clicked_at: Option<String>,
    pub created_at: String,
}

impl From<notification::Model> for NotificationSummary {
    fn from(model: notification::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            channel: model.channel,
            subject: model.subject,
            status: model.status,
            error: model.error,
            opens_count: model.opens_count,
            clicks_count: model.clicks_count,
            scheduled_at: model.scheduled_at.map(|at| at.to_rfc3339()),
            sent_at: model.sent_at.map(|at| at.to_rfc3339()),
            opened_at: model.opened_at.map(|at| at.to_rfc3339()),
            clicked_at: model.clicked_at.map(|at| at.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationListResponse {
    pub data: Vec<NotificationSummary>,
    pub meta: PageInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateEventChannelsRequest {
    /// Channel types delivered by default for the event
    pub channels: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfigureChannelRequest {
    pub active: bool,
    /// Provider settings such as `webhook_url` or `from_address`
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub settings: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsertTemplateRequest {
    /// Defaults to the event key
    pub name: Option<String>,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub variables: Option<JsonValue>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TemplateResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub name: String,
    pub event_key: String,
    pub subject: String,
    pub content: String,
    pub active: bool,
    pub updated_at: String,
}

impl From<template::Model> for TemplateResponse {
    fn from(model: template::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            event_key: model.event_key,
            subject: model.subject,
            content: model.content,
            active: model.active,
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendTestRequest {
    pub event_key: String,
    pub channel: String,
    pub user_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    /// Template variables
    #[serde(default)]
    pub data: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendTestResponse {
    /// Id of the queued notification; null when nothing was sent
    #[schema(value_type = Option<String>)]
    pub notification_id: Option<Uuid>,
    pub queued: bool,
}

fn parse_channel(value: &str) -> Result<ChannelType, ApiError> {
    value
        .parse::<ChannelType>()
        .map_err(|_| unprocessable(&format!("Channel '{value}' is not available or active.")))
}

/// Lists notifications for the tenant, newest first
#[utoipa::path(
    get,
    path = "/admin/notifications",
    security(("bearer_auth" = [])),
    params(TenantHeader, ListNotificationsQuery),
    responses(
        (status = 200, description = "Page of notifications", body = NotificationListResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(validation_error(
            "Invalid page size",
            serde_json::json!({ "per_page": "must be between 1 and 100" }),
        ));
    }
    let page = query.page.unwrap_or(1).max(1);

    let status = query
        .status
        .as_deref()
        .map(str::parse::<NotificationStatus>)
        .transpose()
        .map_err(|_| {
            validation_error(
                "Invalid status filter",
                serde_json::json!({ "status": "must be pending, sent or failed" }),
            )
        })?;
    let channel = query
        .channel
        .as_deref()
        .map(str::parse::<ChannelType>)
        .transpose()
        .map_err(|_| {
            validation_error(
                "Invalid channel filter",
                serde_json::json!({ "channel": "unknown channel type" }),
            )
        })?;

    let filter = NotificationFilter {
        status,
        channel,
        user_id: query.user_id,
        page: page - 1,
        per_page,
    };
    let (items, total) = NotificationRepository::new(&state.db)
        .list(tenant, &filter)
        .await?;

    Ok(Json(NotificationListResponse {
        data: items.into_iter().map(NotificationSummary::from).collect(),
        meta: PageInfo {
            page,
            per_page,
            total,
        },
    }))
}

/// Queue a failed or sent notification for delivery again
#[utoipa::path(
    post,
    path = "/admin/notifications/{id}/resend",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = String, Path, description = "Notification id")),
    responses(
        (status = 202, description = "Notification queued", body = NotificationSummary),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Notification not found", body = ApiError),
        (status = 409, description = "Notification is still pending", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn resend_notification(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<NotificationSummary>), ApiError> {
    let notification = state
        .dispatcher
        .resend(id)
        .await
        .map_err(|err| match err {
            DispatchError::NotFound(_) => not_found(&err.to_string()),
            DispatchError::AlreadyPending(_) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", err.to_string())
            }
            DispatchError::Repository(inner) => inner.into(),
        })?;

    Ok((StatusCode::ACCEPTED, Json(notification.into())))
}

/// Current rate-limit counters and limits
#[utoipa::path(
    get,
    path = "/admin/rate-limit",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Rate limiter status", body = RateLimitStatus, example = json!({
            "enabled": true,
            "limits": {
                "minute": {"max": 60, "current": 3},
                "hour": {"max": 1000, "current": 41},
                "day": {"max": 10000, "current": 310}
            }
        })),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn rate_limit_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<RateLimitStatus>, ApiError> {
    Ok(Json(state.rate_limiter.status().await?))
}

/// Replace the default channel list for an event
#[utoipa::path(
    put,
    path = "/admin/events/{event_key}/channels",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("event_key" = String, Path, description = "Event key")),
    request_body = UpdateEventChannelsRequest,
    responses(
        (status = 200, description = "Updated event", body = Event),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown event", body = ApiError),
        (status = 422, description = "Unknown channel", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn update_event_channels(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(event_key): Path<String>,
    payload: Result<Json<UpdateEventChannelsRequest>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let Json(request) = payload?;
    let channels = request
        .channels
        .iter()
        .map(|value| parse_channel(value))
        .collect::<Result<Vec<_>, _>>()?;

    let event = state
        .events
        .set_default_channels(&event_key, &channels)
        .await?;
    tracing::info!(event_key = %event.key, channels = ?channels, "Updated event default channels");

    Ok(Json(event))
}

/// Activate or deactivate a channel and store its provider settings
#[utoipa::path(
    put,
    path = "/admin/channels/{channel_type}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("channel_type" = String, Path, description = "Channel type")),
    request_body = ConfigureChannelRequest,
    responses(
        (status = 200, description = "Updated channel", body = Channel),
        (status = 400, description = "Settings are missing or malformed", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 422, description = "Unknown or disabled channel", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn configure_channel(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(channel_type): Path<String>,
    payload: Result<Json<ConfigureChannelRequest>, JsonRejection>,
) -> Result<Json<Channel>, ApiError> {
    let Json(request) = payload?;
    let channel_type = parse_channel(&channel_type)?;
    if !state.channels.is_enabled(channel_type) {
        return Err(unprocessable(&format!(
            "Channel '{channel_type}' is not available or active."
        )));
    }

    if let Some(settings) = &request.settings
        && !settings.is_object()
    {
        return Err(validation_error(
            "Invalid channel settings",
            serde_json::json!({ "settings": "must be an object" }),
        ));
    }
    if request.active
        && let Some(transport) = state.transports.get(channel_type)
        && !transport.validate_settings(&flatten_settings(request.settings.as_ref()))
    {
        return Err(validation_error(
            "Incomplete channel settings",
            serde_json::json!({
                "settings": format!("missing required settings for {channel_type}")
            }),
        ));
    }

    let channel = state
        .channels
        .configure(channel_type, request.active, request.settings)
        .await?;
    tracing::info!(
        tenant_id = ?state.tenant.current(),
        channel = %channel_type,
        active = channel.active,
        "Updated channel configuration"
    );

    Ok(Json(channel))
}

/// Create or replace the template used for an event
#[utoipa::path(
    put,
    path = "/admin/templates/{event_key}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("event_key" = String, Path, description = "Event key")),
    request_body = UpsertTemplateRequest,
    responses(
        (status = 200, description = "Stored template", body = TemplateResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown event", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn upsert_template(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(event_key): Path<String>,
    payload: Result<Json<UpsertTemplateRequest>, JsonRejection>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let Json(request) = payload?;
    if state.events.get(&event_key).await?.is_none() {
        return Err(not_found(&format!("Event '{event_key}' not found")));
    }
    if request.subject.trim().is_empty() && request.content.trim().is_empty() {
        return Err(validation_error(
            "Template is empty",
            serde_json::json!({ "content": "subject or content is required" }),
        ));
    }

    let template = TemplateRepository::new(&state.db)
        .upsert_for_event(
            tenant,
            NewTemplate {
                name: request.name.unwrap_or_else(|| event_key.clone()),
                event_key: event_key.clone(),
                subject: request.subject,
                content: request.content,
                variables: request.variables,
                active: request.active,
            },
        )
        .await?;
    tracing::info!(
        tenant_id = ?tenant,
        event_key = %event_key,
        template_id = %template.id,
        "Stored event template"
    );

    Ok(Json(template.into()))
}

/// Send an event to one channel, bypassing preferences
#[utoipa::path(
    post,
    path = "/admin/send-test",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = SendTestRequest,
    responses(
        (status = 202, description = "Send attempted", body = SendTestResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 422, description = "Unknown channel", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn send_test(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<SendTestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SendTestResponse>), ApiError> {
    let Json(request) = payload?;
    let channel = parse_channel(&request.channel)?;

    let recipient = Recipient {
        id: request.user_id,
        name: request.name,
        email: request.email,
        phone: request.phone,
        push_token: request.push_token,
    };
    let notification_id = state
        .dispatcher
        .send_to_channel(
            &recipient,
            &request.event_key,
            channel,
            request.data.unwrap_or(JsonValue::Null),
        )
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendTestResponse {
            notification_id,
            queued: notification_id.is_some(),
        }),
    ))
}
