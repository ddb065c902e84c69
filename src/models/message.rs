//! Message entity model
//!
//! One row per delivered inbound or outbound text. The partial unique index
//! on (lead_id, wa_message_id) makes inbound ingestion idempotent.

use super::lead::Entity as Lead;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Message entity representing one inbound or outbound text record
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    /// Unique identifier for the message (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client identifier for multi-tenancy
    pub client_id: Uuid,

    /// Lead this message belongs to
    pub lead_id: Uuid,

    /// Direction of the message (see [`MessageDirection`])
    pub direction: String,

    /// Channel phone number id the message moved through
    pub phone_number_id: String,

    /// Provider message id; dedup key for inbound, echo for outbound
    pub wa_message_id: Option<String>,

    /// Message text body
    pub text_content: String,

    /// Raw provider payload or response
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_payload: Option<JsonValue>,

    /// Timestamp when the message was recorded
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

/// Direction of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    /// Stored column value for this direction
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "INBOUND",
            MessageDirection::Outbound => "OUTBOUND",
        }
    }
}
