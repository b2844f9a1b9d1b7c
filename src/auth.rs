//! # Authentication
//!
//! Bearer authentication for the preferences and admin APIs. The tenant
//! header (required only when multitenancy is on) scopes the rest of the
//! request through [`TenantContext`](crate::tenant::TenantContext); the
//! `X-User-Id` header names the host-authenticated user for self-service
//! routes.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::server::AppState;

pub const TENANT_HEADER: &str = "X-Tenant-Id";
pub const USER_HEADER: &str = "X-User-Id";

/// Marker type for requests that passed bearer authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Tenant resolved for the request; `None` when multitenancy is off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantExtension(pub Option<Uuid>);

/// User the request acts on behalf of, from `X-User-Id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Validate the bearer token and tenant header, then run the request in the tenant scope.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();

    let token = extract_bearer_token(headers)?;
    validate_token(&state.config, token)?;

    let tenant_id = if state.tenant.is_enabled() {
        Some(extract_tenant_id(headers)?)
    } else {
        None
    };

    tracing::debug!(tenant_id = ?tenant_id, "Authenticated request");

    request.extensions_mut().insert(TenantExtension(tenant_id));
    request.extensions_mut().insert(OperatorAuth);

    Ok(state.tenant.scope(tenant_id, next.run(request)).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

/// Tokens are only optional for local and test profiles; config validation
/// rejects an empty list everywhere else.
fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    if config.api_tokens.is_empty() {
        return Ok(());
    }

    let is_valid = config
        .api_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_tenant_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let header_value = headers
        .get(TENANT_HEADER)
        .ok_or_else(|| {
            validation_error(
                "Missing required header",
                serde_json::json!({ TENANT_HEADER: "Required header is missing" }),
            )
        })?
        .to_str()
        .map_err(|_| {
            validation_error(
                "Invalid tenant header",
                serde_json::json!({ TENANT_HEADER: "Header must be valid UTF-8" }),
            )
        })?;

    header_value.trim().parse::<Uuid>().map_err(|_| {
        validation_error(
            "Invalid tenant ID",
            serde_json::json!({ TENANT_HEADER: "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-Tenant-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct TenantHeader {
    /// Tenant identifier (UUID); required when multitenancy is enabled
    #[serde(rename = "X-Tenant-Id")]
    #[param(rename = "X-Tenant-Id", value_type = Option<String>)]
    pub tenant_id: Option<String>,
}

/// OpenAPI header parameter for X-User-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct UserHeader {
    /// Host application user id
    #[serde(rename = "X-User-Id")]
    #[param(rename = "X-User-Id", value_type = i64)]
    pub user_id: i64,
}

impl<S> FromRequestParts<S> for TenantExtension
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantExtension>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if parts.extensions.get::<OperatorAuth>().is_none() {
            return Err(unauthorized(Some("Authentication required")));
        }

        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .map(AuthenticatedUser)
            .ok_or_else(|| unauthorized(Some("Missing or invalid X-User-Id header")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn bearer_token_is_extracted() {
        let map = headers(&[("authorization", "Bearer abc")]);
        assert_eq!(extract_bearer_token(&map).unwrap(), "abc");

        let basic = headers(&[("authorization", "Basic dGVzdDoxMjM=")]);
        assert!(extract_bearer_token(&basic).is_err());
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn tokens_compare_against_every_configured_value() {
        let config = AppConfig {
            api_tokens: vec!["token-one".to_string(), "token-two".to_string()],
            ..Default::default()
        };
        assert!(validate_token(&config, "token-two").is_ok());
        assert!(validate_token(&config, "token-three").is_err());
    }

    #[test]
    fn tenant_header_must_be_uuid() {
        let id = Uuid::new_v4();
        let map = headers(&[("x-tenant-id", &id.to_string())]);
        assert_eq!(extract_tenant_id(&map).unwrap(), id);

        let bad = headers(&[("x-tenant-id", "not-a-uuid")]);
        assert_eq!(
            extract_tenant_id(&bad).unwrap_err().status,
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
