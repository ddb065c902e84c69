//! # Reminder Trigger Handler
//!
//! The authenticated "process due reminders now" operation. Safe to invoke
//! repeatedly and concurrently: every job transition is conditional on the
//! row still being PENDING.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::validate_scheduler_secret;
use crate::error::ApiError;
use crate::scheduler::{ReminderRunSummary, ReminderScheduler};
use crate::server::AppState;

/// Query parameters for the reminder trigger
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReminderTriggerQuery {
    /// Scheduler secret (alternative to the bearer/header forms)
    pub secret: Option<String>,
}

/// Process due reminder jobs
#[utoipa::path(
    post,
    path = "/internal/reminders/process",
    params(ReminderTriggerQuery),
    responses(
        (status = 200, description = "Batch processed", body = ReminderRunSummary),
        (status = 401, description = "Missing or invalid scheduler secret", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    ),
    tag = "reminders"
)]
pub async fn process_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReminderTriggerQuery>,
) -> Result<Json<ReminderRunSummary>, ApiError> {
    validate_scheduler_secret(&state.config, &headers, query.secret.as_deref())?;

    let scheduler = ReminderScheduler::from_state(&state);
    let summary = scheduler.process_due().await?;

    Ok(Json(summary))
}
