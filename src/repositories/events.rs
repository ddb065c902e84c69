//! # Lead Step Event Repository
//!
//! Append-only audit log of routing decisions. Every option resolution
//! attempt is recorded here, matched or not; the per-step count doubles as
//! the same-step loop safety counter.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use uuid::Uuid;

use crate::models::lead_step_event::{ActiveModel, Column, Entity as LeadStepEvent, MappingSource};
use crate::models::to_db_time;

/// Fields of one routing decision
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub client_id: Uuid,
    pub lead_id: Uuid,
    pub flow_id: Uuid,
    pub step_id: Uuid,
    pub raw_user_text: String,
    pub selected_option_id: Option<Uuid>,
    pub mapping_source: MappingSource,
    pub ai_summary: Option<String>,
    pub ai_out_of_scope: bool,
}

/// Repository for LeadStepEvent database operations
pub struct EventRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EventRepository<'a> {
    /// Create a new EventRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append one routing decision.
    pub async fn record(&self, event: NewEvent, now: DateTime<Utc>) -> Result<(), DbErr> {
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            client_id: Set(event.client_id),
            lead_id: Set(event.lead_id),
            flow_id: Set(event.flow_id),
            step_id: Set(event.step_id),
            raw_user_text: Set(event.raw_user_text),
            selected_option_id: Set(event.selected_option_id),
            mapping_source: Set(event.mapping_source.as_str().to_string()),
            ai_summary: Set(event.ai_summary),
            ai_out_of_scope: Set(event.ai_out_of_scope),
            created_at: Set(to_db_time(now)),
        };

        model.insert(self.db).await?;
        Ok(())
    }

    /// Routing events recorded for a lead on one step (same-step loop cap).
    pub async fn count_for_step(&self, lead_id: Uuid, step_id: Uuid) -> Result<u64, DbErr> {
        LeadStepEvent::find()
            .filter(Column::LeadId.eq(lead_id))
            .filter(Column::StepId.eq(step_id))
            .count(self.db)
            .await
    }
}
