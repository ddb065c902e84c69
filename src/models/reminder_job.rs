//! ReminderJob entity model
//!
//! A scheduled nudge tied to a lead's current step. Jobs are consumed by the
//! reminder scheduler; every transition out of PENDING is conditional on the
//! row still being PENDING, and terminal statuses are never reopened.

use super::lead::Entity as Lead;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// ReminderJob entity representing one scheduled nudge
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "reminder_jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client identifier for multi-tenancy
    pub client_id: Uuid,

    /// Lead the nudge targets
    pub lead_id: Uuid,

    /// Ordinal of this reminder for the lead (1-based)
    pub reminder_number: i32,

    /// When the job becomes due
    pub scheduled_for: DateTimeWithTimeZone,

    /// Current status of the job (see [`ReminderJobStatus`])
    pub status: String,

    /// When the job was resolved (sent, skipped, or failed)
    pub sent_at: Option<DateTimeWithTimeZone>,

    /// Why the job was skipped or failed
    pub error_text: Option<String>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Lead",
        from = "Column::LeadId",
        to = "super::lead::Column::Id"
    )]
    Lead,
}

impl Related<Lead> for Entity {
    fn to() -> RelationDef {
        Relation::Lead.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Status of a reminder job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderJobStatus {
    Pending,
    Sent,
    Skipped,
    Failed,
}

impl ReminderJobStatus {
    /// Stored column value for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderJobStatus::Pending => "PENDING",
            ReminderJobStatus::Sent => "SENT",
            ReminderJobStatus::Skipped => "SKIPPED",
            ReminderJobStatus::Failed => "FAILED",
        }
    }
}
