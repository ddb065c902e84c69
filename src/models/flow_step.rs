//! FlowStep entity model
//!
//! A step is one prompt node in a flow tree. step_order is both the display
//! order and the linear fallback when an option has no explicit next step.

use super::flow::Entity as ClientFlow;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// FlowStep entity representing one prompt in the tree
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "flow_steps")]
pub struct Model {
    /// Unique identifier for the step (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Flow this step belongs to
    pub flow_id: Uuid,

    /// Ordering key within the flow; drives the next-by-order fallback
    pub step_order: i32,

    /// Prompt text sent to the user when the lead reaches this step
    pub prompt_text: String,

    /// Whether free text is expected here (informational for flow authors)
    pub allow_free_text: bool,

    /// Timestamp when the step was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "ClientFlow",
        from = "Column::FlowId",
        to = "super::flow::Column::Id"
    )]
    Flow,
}

impl Related<ClientFlow> for Entity {
    fn to() -> RelationDef {
        Relation::Flow.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
