//! FlowStepOption entity model
//!
//! An option is a selectable edge out of a step: a stable code for AI
//! matching, a score delta, escalation/terminal markers, and an optional
//! explicit target step.

use super::flow_step::Entity as FlowStep;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// FlowStepOption entity representing a selectable branch out of a step
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "flow_step_options")]
pub struct Model {
    /// Unique identifier for the option (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Step this option hangs off
    pub step_id: Uuid,

    /// Ordering key; also what a bare numeric reply selects
    pub option_order: i32,

    /// Stable label used when asking the classifier to map free text
    pub option_code: String,

    /// Human-readable label rendered in option lists
    pub label_text: String,

    /// Score adjustment applied when this option is selected, bounded ±100
    pub score_delta: i32,

    /// Selecting this option escalates the lead to a human
    pub is_contact_human: bool,

    /// Selecting this option parks the lead in the reentry sub-state
    pub is_terminal: bool,

    /// Explicit next step; None falls back to next step by order
    pub next_step_id: Option<Uuid>,

    /// Timestamp when the option was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "FlowStep",
        from = "Column::StepId",
        to = "super::flow_step::Column::Id"
    )]
    Step,
}

impl Related<FlowStep> for Entity {
    fn to() -> RelationDef {
        Relation::Step.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
