//! ClientFlow entity model
//!
//! A flow is a versioned conversation tree for a client. At most one flow per
//! client is active; activation deactivates the prior flow in one transaction.

use super::client::Entity as Client;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// ClientFlow entity representing one conversation tree
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "client_flows")]
pub struct Model {
    /// Unique identifier for the flow (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client identifier for multi-tenancy
    pub client_id: Uuid,

    /// Display name of the flow version
    pub name: String,

    /// Whether this is the client's currently active flow
    pub is_active: bool,

    /// Greeting sent once when a lead is created
    pub welcome_message: String,

    /// Maximum reminder nudges a lead may receive on this flow
    pub max_reminders: i32,

    /// Minutes of inactivity before a reminder becomes due
    pub reminder_delay_minutes: i32,

    /// Consecutive unmatched messages before the lead is closed
    pub max_irrelevant_streak: i32,

    /// Timestamp when the flow was created
    pub created_at: DateTimeWithTimeZone,
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
