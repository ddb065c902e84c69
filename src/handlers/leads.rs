//! # Operator Lead Handlers
//!
//! The two operator-driven state transitions: claiming an escalated lead
//! (HUMAN_REQUIRED -> HUMAN_TAKEN, mutually exclusive under concurrency) and
//! explicitly closing a lead. Both sit behind operator bearer authentication.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::repositories::{LeadRepository, ReminderJobRepository};
use crate::server::AppState;

/// Result of an operator lead action
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LeadActionResponse {
    /// The lead acted on
    pub lead_id: Uuid,
    /// Conversation status after the action
    pub conversation_status: String,
}

/// Claim an escalated lead for human handling
#[utoipa::path(
    post,
    path = "/api/v1/leads/{id}/take",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Lead UUID")),
    responses(
        (status = 200, description = "Lead claimed", body = LeadActionResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError),
        (status = 409, description = "Lead is not awaiting a human", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn take_lead(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<LeadActionResponse>, ApiError> {
    let leads = LeadRepository::new(&state.db);
    let now = Utc::now();

    if leads.claim_for_operator(lead_id, now).await? {
        tracing::info!(lead_id = %lead_id, "Lead claimed by operator");
        return Ok(Json(LeadActionResponse {
            lead_id,
            conversation_status: "HUMAN_TAKEN".to_string(),
        }));
    }

    // The conditional update did not fire: distinguish absent from contested
    match leads.find_any_by_id(lead_id).await? {
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Lead not found",
        )),
        Some(lead) => Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            &format!(
                "Lead is not awaiting a human (status: {})",
                lead.conversation_status
            ),
        )),
    }
}

/// Explicitly close a lead
#[utoipa::path(
    post,
    path = "/api/v1/leads/{id}/close",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Lead UUID")),
    responses(
        (status = 200, description = "Lead closed", body = LeadActionResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Lead not found", body = ApiError),
        (status = 409, description = "Lead already closed", body = ApiError)
    ),
    tag = "leads"
)]
pub async fn close_lead(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<LeadActionResponse>, ApiError> {
    let leads = LeadRepository::new(&state.db);
    let now = Utc::now();

    if leads.close_by_operator(lead_id, now).await? {
        ReminderJobRepository::new(&state.db)
            .cancel_pending(lead_id, "lead closed by operator", now)
            .await?;

        tracing::info!(lead_id = %lead_id, "Lead closed by operator");
        return Ok(Json(LeadActionResponse {
            lead_id,
            conversation_status: "CLOSED".to_string(),
        }));
    }

    match leads.find_any_by_id(lead_id).await? {
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Lead not found",
        )),
        Some(_) => Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Lead already closed",
        )),
    }
}
