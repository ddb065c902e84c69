//! Client entity model
//!
//! This module contains the SeaORM entity model for the clients table,
//! which stores tenant information for multi-tenancy.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Client entity representing one tenant of the engine
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    /// Unique identifier for the client (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name of the business
    pub name: String,

    /// Lead score at or above which routing escalates to a human
    pub score_threshold: i32,

    /// Address that receives the one-shot escalation notification email
    pub notification_email: String,

    /// Phone number offered to the end user in handoff messages (optional)
    pub human_forward_number: Option<String>,

    /// Timestamp when the client was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
