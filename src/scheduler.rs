//! # Reminder Scheduler
//!
//! Bounded batch that re-engages stalled leads: for each due PENDING job it
//! replays the same step rendering the inbound pipeline uses, prefixed with a
//! reminder banner. Every job transition is conditional on the row still
//! being PENDING so overlapping runs never double-process, and one job's
//! failure never aborts the batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::crypto::{CryptoKey, decrypt_channel_secrets};
use crate::flow::{self, RenderConfig, render_step_prompt};
use crate::models::lead;
use crate::models::reminder_job::Model as JobModel;
use crate::models::{ConversationStatus, MessageDirection, to_db_time};
use crate::repositories::{
    ChannelRepository, FlowRepository, LeadRepository, MessageRepository, NewMessage,
    ReminderJobRepository,
};
use crate::server::AppState;
use crate::wa::{SendCredentials, WhatsAppSender};

const MAX_ERROR_TEXT_CHARS: usize = 700;

/// Counts returned by one scheduler invocation
#[derive(Debug, Default, Clone, Serialize, ToSchema)]
pub struct ReminderRunSummary {
    /// Jobs examined this run
    pub processed: u64,
    /// Nudges delivered
    pub sent: u64,
    /// Jobs skipped (lead no longer eligible, cap reached, already resolved)
    pub skipped: u64,
    /// Jobs failed (no channel, send failure, unexpected error)
    pub failed: u64,
}

enum JobOutcome {
    Sent,
    Skipped,
    Failed,
    /// An overlapping run resolved the job first; nothing was sent by us
    AlreadyResolved,
}

/// The batch reminder processor.
pub struct ReminderScheduler {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    crypto_key: CryptoKey,
    sender: Arc<dyn WhatsAppSender>,
}

impl ReminderScheduler {
    /// Build a scheduler from the shared application state.
    pub fn from_state(state: &AppState) -> Self {
        Self {
            config: Arc::clone(&state.config),
            db: state.db.clone(),
            crypto_key: state.crypto_key.clone(),
            sender: Arc::clone(&state.sender),
        }
    }

    /// Process due PENDING jobs in ascending schedule order, bounded by the
    /// configured batch size.
    pub async fn process_due(&self) -> Result<ReminderRunSummary, DbErr> {
        let now = Utc::now();
        let mut summary = ReminderRunSummary::default();

        let jobs = ReminderJobRepository::new(&self.db)
            .due_jobs(now, self.config.reminders.batch_size)
            .await?;

        for job in jobs {
            summary.processed += 1;
            let job_id = job.id;

            let outcome = match self.process_job(&job, now).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let reason = truncate_error(&err.to_string());
                    warn!(job_id = %job_id, error = %reason, "Reminder job failed");
                    ReminderJobRepository::new(&self.db)
                        .mark_failed(job_id, &reason, now)
                        .await?;
                    JobOutcome::Failed
                }
            };

            match outcome {
                JobOutcome::Sent => summary.sent += 1,
                JobOutcome::Skipped | JobOutcome::AlreadyResolved => summary.skipped += 1,
                JobOutcome::Failed => summary.failed += 1,
            }
        }

        counter!("leadflow_reminders_processed_total").increment(summary.processed);
        counter!("leadflow_reminders_sent_total").increment(summary.sent);

        info!(
            processed = summary.processed,
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            "Reminder batch completed"
        );

        Ok(summary)
    }

    async fn process_job(&self, job: &JobModel, now: DateTime<Utc>) -> Result<JobOutcome, DbErr> {
        let leads = LeadRepository::new(&self.db);
        let flows = FlowRepository::new(&self.db);
        let jobs = ReminderJobRepository::new(&self.db);

        // Only ACTIVE, fully bound leads receive nudges
        let lead = leads.find_by_id(job.client_id, job.lead_id).await?;
        let Some(lead) = lead.filter(|l| l.status() == ConversationStatus::Active) else {
            return self
                .skip(&jobs, job, "Lead not active or missing flow/current step", now)
                .await;
        };
        let (Some(flow_id), Some(current_step_id)) = (lead.flow_id, lead.current_step_id) else {
            return self
                .skip(&jobs, job, "Lead not active or missing flow/current step", now)
                .await;
        };

        let flow = flows.flow_by_id(flow_id).await?;
        let step_bundle = flows.step_with_options(current_step_id).await?;
        let (Some(flow), Some((step, options))) = (flow, step_bundle) else {
            return self.skip(&jobs, job, "Missing flow or step", now).await;
        };

        if lead.reminders_sent >= flow.max_reminders {
            return self.skip(&jobs, job, "Reminder limit reached", now).await;
        }

        // Prefer the channel the conversation actually ran on
        let messages = MessageRepository::new(&self.db);
        let channels = ChannelRepository::new(&self.db);
        let channel = match messages.last_phone_number_id(lead.id).await? {
            Some(phone_number_id) => {
                channels
                    .find_active_for_client_phone(lead.client_id, &phone_number_id)
                    .await?
            }
            None => None,
        };
        let channel = match channel {
            Some(channel) => Some(channel),
            None => channels.find_any_active_for_client(lead.client_id).await?,
        };
        let Some(channel) = channel else {
            let resolved = jobs.mark_failed(job.id, "No active channel", now).await?;
            return Ok(if resolved {
                JobOutcome::Failed
            } else {
                JobOutcome::AlreadyResolved
            });
        };

        let (access_token, _signing_secret) =
            match decrypt_channel_secrets(&self.crypto_key, &channel) {
                Ok(secrets) => secrets,
                Err(err) => {
                    let reason = truncate_error(&format!("Channel secret unusable: {}", err));
                    let resolved = jobs.mark_failed(job.id, &reason, now).await?;
                    return Ok(if resolved {
                        JobOutcome::Failed
                    } else {
                        JobOutcome::AlreadyResolved
                    });
                }
            };

        let first_step = flows.first_step(flow.id).await?;
        let is_submenu = first_step.as_ref().is_some_and(|first| first.id != step.id);
        let reminder_text = format!(
            "{}\n\n{}",
            flow::REMINDER_BANNER,
            render_step_prompt(
                &step.prompt_text,
                &options,
                RenderConfig {
                    include_back_to_main_menu: is_submenu,
                }
            )
        );

        let credentials = SendCredentials {
            phone_number_id: channel.phone_number_id.clone(),
            access_token,
        };

        let receipt = match self
            .sender
            .send_text(&credentials, &lead.wa_user_id, &reminder_text)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                let reason = truncate_error(&err.to_string());
                warn!(job_id = %job.id, lead_id = %lead.id, error = %reason, "Reminder send failed");
                let resolved = jobs.mark_failed(job.id, &reason, now).await?;
                return Ok(if resolved {
                    JobOutcome::Failed
                } else {
                    JobOutcome::AlreadyResolved
                });
            }
        };

        // Claim the job; an overlapping run may have resolved it while we
        // were sending, in which case we must not touch counters again
        if !jobs.mark_sent(job.id, now).await? {
            warn!(job_id = %job.id, "Reminder job resolved by a concurrent run");
            return Ok(JobOutcome::AlreadyResolved);
        }

        messages
            .insert_outbound(
                NewMessage {
                    client_id: lead.client_id,
                    lead_id: lead.id,
                    direction: MessageDirection::Outbound,
                    phone_number_id: credentials.phone_number_id.clone(),
                    wa_message_id: receipt.wa_message_id,
                    text_content: reminder_text,
                    raw_payload: Some(receipt.raw_response),
                },
                now,
            )
            .await?;

        let next_reminders_sent = lead.reminders_sent + 1;
        let update = lead::ActiveModel {
            id: Set(lead.id),
            reminders_sent: Set(next_reminders_sent),
            last_bot_message_at: Set(Some(to_db_time(now))),
            updated_at: Set(to_db_time(now)),
            ..Default::default()
        };
        update.update(&self.db).await?;

        // Schedule the next nudge unless this one hit the cap
        if next_reminders_sent < flow.max_reminders {
            let scheduled_for = now + Duration::minutes(flow.reminder_delay_minutes as i64);
            jobs.schedule(
                lead.client_id,
                lead.id,
                next_reminders_sent + 1,
                scheduled_for,
                now,
            )
            .await?;
        }

        debug!(job_id = %job.id, lead_id = %lead.id, number = job.reminder_number, "Reminder sent");
        Ok(JobOutcome::Sent)
    }

    async fn skip(
        &self,
        jobs: &ReminderJobRepository<'_>,
        job: &JobModel,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, DbErr> {
        let resolved = jobs.mark_skipped(job.id, reason, now).await?;
        if !resolved {
            warn!(job_id = %job.id, "Reminder job resolved by a concurrent run");
            return Ok(JobOutcome::AlreadyResolved);
        }
        debug!(job_id = %job.id, reason, "Reminder job skipped");
        Ok(JobOutcome::Skipped)
    }
}

fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_TEXT_CHARS {
        return message.to_string();
    }
    message.chars().take(MAX_ERROR_TEXT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_error_keeps_short_messages() {
        assert_eq!(truncate_error("boom"), "boom");
    }

    #[test]
    fn truncate_error_bounds_long_messages_on_char_boundaries() {
        let long = "ñ".repeat(1000);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_TEXT_CHARS);
    }

    #[test]
    fn summary_defaults_to_zero() {
        let summary = ReminderRunSummary::default();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);
    }
}
