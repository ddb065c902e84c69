//! # Reminder Job Repository
//!
//! The reminder queue: scheduling on step advance, the due-job batch scan,
//! and the conditional PENDING transitions that guard overlapping scheduler
//! runs against double-processing.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::reminder_job::{
    ActiveModel, Column, Entity as ReminderJob, Model, ReminderJobStatus,
};
use crate::models::to_db_time;

/// Repository for ReminderJob database operations
pub struct ReminderJobRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ReminderJobRepository<'a> {
    /// Create a new ReminderJobRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Cancel every PENDING job of a lead (advance, escalation, close).
    ///
    /// Cancelled jobs become SKIPPED with the given reason; terminal rows are
    /// untouched. Returns how many jobs were cancelled.
    pub async fn cancel_pending(
        &self,
        lead_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = ReminderJob::update_many()
            .col_expr(
                Column::Status,
                Expr::value(ReminderJobStatus::Skipped.as_str()),
            )
            .col_expr(Column::SentAt, Expr::value(Some(to_db_time(now))))
            .col_expr(Column::ErrorText, Expr::value(Some(reason.to_string())))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::LeadId.eq(lead_id))
            .filter(Column::Status.eq(ReminderJobStatus::Pending.as_str()))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Replace the lead's pending nudge: cancel prior PENDING jobs and insert
    /// a fresh one due at `scheduled_for`.
    pub async fn schedule(
        &self,
        client_id: Uuid,
        lead_id: Uuid,
        reminder_number: i32,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        self.cancel_pending(lead_id, "superseded by newer schedule", now)
            .await?;

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            client_id: Set(client_id),
            lead_id: Set(lead_id),
            reminder_number: Set(reminder_number),
            scheduled_for: Set(to_db_time(scheduled_for)),
            status: Set(ReminderJobStatus::Pending.as_str().to_string()),
            sent_at: Set(None),
            error_text: Set(None),
            created_at: Set(to_db_time(now)),
            updated_at: Set(to_db_time(now)),
        };

        job.insert(self.db).await
    }

    /// Due PENDING jobs in ascending schedule order, bounded by `limit`.
    pub async fn due_jobs(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<Model>, DbErr> {
        ReminderJob::find()
            .filter(Column::Status.eq(ReminderJobStatus::Pending.as_str()))
            .filter(Column::ScheduledFor.lte(to_db_time(now)))
            .order_by_asc(Column::ScheduledFor)
            .limit(limit)
            .all(self.db)
            .await
    }

    /// Mark a job SENT, conditional on it still being PENDING.
    ///
    /// Returns whether this caller performed the transition; false means an
    /// overlapping run already resolved the job.
    pub async fn mark_sent(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        self.resolve(job_id, ReminderJobStatus::Sent, None, now).await
    }

    /// Mark a job SKIPPED, conditional on it still being PENDING.
    pub async fn mark_skipped(
        &self,
        job_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        self.resolve(job_id, ReminderJobStatus::Skipped, Some(reason), now)
            .await
    }

    /// Mark a job FAILED, conditional on it still being PENDING.
    pub async fn mark_failed(
        &self,
        job_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        self.resolve(job_id, ReminderJobStatus::Failed, Some(reason), now)
            .await
    }

    async fn resolve(
        &self,
        job_id: Uuid,
        status: ReminderJobStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = ReminderJob::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::SentAt, Expr::value(Some(to_db_time(now))))
            .col_expr(Column::ErrorText, Expr::value(reason.map(str::to_string)))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(ReminderJobStatus::Pending.as_str()))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }
}
