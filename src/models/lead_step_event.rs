//! LeadStepEvent entity model
//!
//! Append-only audit record of one routing decision: the raw user text, the
//! option it resolved to (if any), and how the mapping was made.

use super::lead::Entity as Lead;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// LeadStepEvent entity representing one option resolution attempt
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "lead_step_events")]
pub struct Model {
    /// Unique identifier for the event (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client identifier for multi-tenancy
    pub client_id: Uuid,

    /// Lead the decision was made for
    pub lead_id: Uuid,

    /// Flow the lead was on at decision time
    pub flow_id: Uuid,

    /// Step the decision was made at
    pub step_id: Uuid,

    /// Unmodified inbound user text
    pub raw_user_text: String,

    /// Option the text resolved to; None for out-of-scope attempts
    pub selected_option_id: Option<Uuid>,

    /// How the mapping was produced (see [`MappingSource`])
    pub mapping_source: String,

    /// Classifier summary of the text, when the classifier ran
    pub ai_summary: Option<String>,

    /// Whether the classifier declared the text out of scope
    pub ai_out_of_scope: bool,

    /// Timestamp when the event was recorded
    pub created_at: DateTimeWithTimeZone,
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

/// How an inbound text was mapped to an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    DirectOption,
    AiMapped,
    OutOfScope,
}

impl MappingSource {
    /// Stored column value for this mapping source
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::DirectOption => "DIRECT_OPTION",
            MappingSource::AiMapped => "AI_MAPPED",
            MappingSource::OutOfScope => "OUT_OF_SCOPE",
        }
    }
}
