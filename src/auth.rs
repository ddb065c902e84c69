//! # Authentication and Authorization
//!
//! This module provides operator bearer authentication for the panel lead
//! endpoints and shared-secret validation for the reminder scheduler trigger.
//! Both use constant-time comparison. Webhook deliveries are authenticated
//! separately, per channel, by signature (see webhook_verification).

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};
use crate::server::AppState;

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates operator bearer tokens
pub async fn operator_auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let token = extract_bearer_token(&headers)?;
    validate_operator_token(&config, token)?;

    tracing::debug!("Authenticated operator request");

    let mut request = request;
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

fn validate_operator_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

/// Validate the reminder-scheduler shared secret.
///
/// The secret may arrive as a bearer token, the `X-Internal-Scheduler-Secret`
/// header, or a `secret` query parameter; the first source present wins. With
/// no secret configured, the trigger is open only in local/test profiles.
pub fn validate_scheduler_secret(
    config: &AppConfig,
    headers: &HeaderMap,
    query_secret: Option<&str>,
) -> Result<(), ApiError> {
    let Some(configured) = config.scheduler_secret.as_deref() else {
        if matches!(config.profile.as_str(), "local" | "test") {
            return Ok(());
        }
        return Err(unauthorized(Some("Scheduler secret not configured")));
    };

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim);
    let from_header = headers
        .get("x-internal-scheduler-secret")
        .and_then(|value| value.to_str().ok());

    let provided = bearer.or(from_header).or(query_secret).unwrap_or("");

    if ConstantTimeEq::ct_eq(provided.as_bytes(), configured.as_bytes()).into() {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid scheduler secret")))
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}
