//! # Webhook Handlers
//!
//! The WhatsApp webhook surface: the one-time GET verification handshake and
//! the POST delivery endpoint that feeds the conversation engine. Soft
//! outcomes acknowledge with 200 and a reason code; only signature failures
//! and downstream-dependency errors produce a non-success response, because
//! the gateway retries indefinitely on non-2xx.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::engine::ConversationEngine;
use crate::error::ApiError;
use crate::server::AppState;
use crate::webhook_verification::SIGNATURE_HEADER;

/// Acknowledgement returned for every accepted delivery
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Always true for accepted deliveries
    pub received: bool,
    /// Outcome code of the turn (e.g. "advanced", "deduplicated")
    pub outcome: String,
    /// Escalation reason, present only when outcome is "escalated"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Gateway verification handshake (performed once at channel setup)
#[utoipa::path(
    get,
    path = "/webhooks/whatsapp",
    params(
        ("hub.mode" = Option<String>, Query, description = "Must be 'subscribe'"),
        ("hub.verify_token" = Option<String>, Query, description = "Configured verify token"),
        ("hub.challenge" = Option<String>, Query, description = "Echo-back challenge"),
    ),
    responses(
        (status = 200, description = "Challenge echoed back"),
        (status = 403, description = "Verification failed", body = ApiError),
        (status = 500, description = "Verify token not configured", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let Some(expected_token) = state.config.webhook_verify_token.as_deref() else {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Webhook verify token not configured",
        ));
    };

    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge");

    let token_matches = token
        .map(|t| ConstantTimeEq::ct_eq(t.as_bytes(), expected_token.as_bytes()).into())
        .unwrap_or(false);

    if mode == Some("subscribe")
        && token_matches
        && let Some(challenge) = challenge
    {
        return Ok((StatusCode::OK, challenge.clone()).into_response());
    }

    Err(ApiError::new(
        StatusCode::FORBIDDEN,
        "FORBIDDEN",
        "Webhook verification failed",
    ))
}

/// Inbound message delivery
#[utoipa::path(
    post,
    path = "/webhooks/whatsapp",
    request_body = String,
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 401, description = "Signature rejected", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError),
        (status = 502, description = "Outbound send failure", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let engine = ConversationEngine::from_state(&state);
    let outcome = engine.process_delivery(&body, signature_header).await?;

    tracing::info!(outcome = outcome.code(), "Webhook delivery processed");

    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.code().to_string(),
        reason: outcome.escalation().map(|r| r.as_str().to_string()),
    }))
}
