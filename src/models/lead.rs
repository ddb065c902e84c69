//! Lead entity model
//!
//! A lead is one end-user conversation session: status, position in the flow,
//! accumulated score, streak counters, and the reentry routing sub-state.
//! Leads are mutated every turn and never physically deleted.

use super::client::Entity as Client;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Lead entity representing one conversation session
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "leads")]
pub struct Model {
    /// Unique identifier for the lead (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client identifier for multi-tenancy
    pub client_id: Uuid,

    /// WhatsApp user id of the end user
    pub wa_user_id: String,

    /// Profile name reported by WhatsApp, if any
    pub wa_profile_name: Option<String>,

    /// Conversation status (see [`ConversationStatus`])
    pub conversation_status: String,

    /// Why the lead escalated, when status is HUMAN_REQUIRED or later
    pub human_required_reason: Option<String>,

    /// Routing sub-state (see [`RoutingState`])
    pub routing_state: String,

    /// Accumulated lead score, clamped to 0..=100
    pub score: i32,

    /// Flow the lead is bound to
    pub flow_id: Option<Uuid>,

    /// Step the lead is currently parked on
    pub current_step_id: Option<Uuid>,

    /// Reminder nudges already delivered
    pub reminders_sent: i32,

    /// Consecutive unmatched inbound messages
    pub irrelevant_streak: i32,

    /// Last classifier summary of unmatched free text
    pub free_text_summary: Option<String>,

    /// Opaque extraction payload carried for forward compatibility
    #[sea_orm(column_type = "JsonBinary")]
    pub extracted_fields: Option<JsonValue>,

    /// When the escalation notification email was sent (at-most-once gate)
    pub notified_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last inbound user message
    pub last_user_message_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last outbound bot message
    pub last_bot_message_at: Option<DateTimeWithTimeZone>,

    /// When the lead was closed, for the reopen cooldown window
    pub closed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the lead was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the lead was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Client",
        from = "Column::ClientId",
        to = "super::client::Column::Id"
    )]
    Client,
}

impl Related<Client> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Typed view over the conversation_status column.
    pub fn status(&self) -> ConversationStatus {
        ConversationStatus::parse(&self.conversation_status)
            .unwrap_or(ConversationStatus::Closed)
    }

    /// Typed view over the routing_state column.
    pub fn routing(&self) -> RoutingState {
        RoutingState::parse(&self.routing_state).unwrap_or(RoutingState::Routing)
    }
}

/// Lifecycle status of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ConversationStatus {
    Active,
    HumanRequired,
    HumanTaken,
    Closed,
}

impl ConversationStatus {
    /// Stored column value for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "ACTIVE",
            ConversationStatus::HumanRequired => "HUMAN_REQUIRED",
            ConversationStatus::HumanTaken => "HUMAN_TAKEN",
            ConversationStatus::Closed => "CLOSED",
        }
    }

    /// Parse a stored column value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(ConversationStatus::Active),
            "HUMAN_REQUIRED" => Some(ConversationStatus::HumanRequired),
            "HUMAN_TAKEN" => Some(ConversationStatus::HumanTaken),
            "CLOSED" => Some(ConversationStatus::Closed),
            _ => None,
        }
    }

    /// Statuses that count as an open lead for the at-most-one-open invariant
    pub fn open_statuses() -> [&'static str; 3] {
        ["ACTIVE", "HUMAN_REQUIRED", "HUMAN_TAKEN"]
    }
}

/// Routing sub-state of an ACTIVE lead.
///
/// `AwaitingReentryChoice` is the parked state after a terminal option, where
/// the next message is interpreted as a 0/1 resume-or-escalate choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingState {
    Routing,
    AwaitingReentryChoice,
}

impl RoutingState {
    /// Stored column value for this sub-state
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingState::Routing => "ROUTING",
            RoutingState::AwaitingReentryChoice => "AWAITING_REENTRY_CHOICE",
        }
    }

    /// Parse a stored column value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ROUTING" => Some(RoutingState::Routing),
            "AWAITING_REENTRY_CHOICE" => Some(RoutingState::AwaitingReentryChoice),
            _ => None,
        }
    }
}

/// Reason a lead was escalated to HUMAN_REQUIRED, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum EscalationReason {
    SafetyMaxBotTurns,
    SafetySameStepLoop,
    UserRequest,
    ScoreThreshold,
    ReentryEscalation,
    FlowCompleted,
}

impl EscalationReason {
    /// Stored column value for this reason
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::SafetyMaxBotTurns => "SAFETY_MAX_BOT_TURNS",
            EscalationReason::SafetySameStepLoop => "SAFETY_SAME_STEP_LOOP",
            EscalationReason::UserRequest => "USER_REQUEST",
            EscalationReason::ScoreThreshold => "SCORE_THRESHOLD",
            EscalationReason::ReentryEscalation => "REENTRY_ESCALATION",
            EscalationReason::FlowCompleted => "FLOW_COMPLETED",
        }
    }
}
