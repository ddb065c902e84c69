//! # Message Repository
//!
//! Message persistence plus the counters built on it: the idempotent inbound
//! insert (unique-violation aware), the rolling-window rate-limit count, and
//! the outbound-turn safety count.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::message::{Column, Entity as Message, MessageDirection, Model};
use crate::models::to_db_time;

/// Fields of a message to be recorded
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub client_id: Uuid,
    pub lead_id: Uuid,
    pub direction: MessageDirection,
    pub phone_number_id: String,
    pub wa_message_id: Option<String>,
    pub text_content: String,
    pub raw_payload: Option<JsonValue>,
}

/// Result of an idempotent inbound insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The message was stored
    Inserted,
    /// A message with this wa_message_id already exists for the lead
    Duplicate,
}

/// Repository for Message database operations
pub struct MessageRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MessageRepository<'a> {
    /// Create a new MessageRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert an inbound message, treating a unique violation on
    /// (lead_id, wa_message_id) as a duplicate delivery rather than an error.
    pub async fn insert_inbound(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, DbErr> {
        match self.insert(message, now).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Duplicate),
            Err(err) => Err(err),
        }
    }

    /// Insert an outbound message record.
    pub async fn insert_outbound(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        self.insert(message, now).await
    }

    async fn insert(&self, message: NewMessage, now: DateTime<Utc>) -> Result<Model, DbErr> {
        let model = crate::models::message::ActiveModel {
            id: Set(Uuid::new_v4()),
            client_id: Set(message.client_id),
            lead_id: Set(message.lead_id),
            direction: Set(message.direction.as_str().to_string()),
            phone_number_id: Set(message.phone_number_id),
            wa_message_id: Set(message.wa_message_id),
            text_content: Set(message.text_content),
            raw_payload: Set(message.raw_payload),
            created_at: Set(to_db_time(now)),
        };

        model.insert(self.db).await
    }

    /// Inbound messages of a lead newer than `cutoff` (rate-limit window).
    pub async fn count_inbound_since(
        &self,
        lead_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        Message::find()
            .filter(Column::LeadId.eq(lead_id))
            .filter(Column::Direction.eq(MessageDirection::Inbound.as_str()))
            .filter(Column::CreatedAt.gt(to_db_time(cutoff)))
            .count(self.db)
            .await
    }

    /// Total outbound messages of a lead (safety turn cap).
    pub async fn count_outbound(&self, lead_id: Uuid) -> Result<u64, DbErr> {
        Message::find()
            .filter(Column::LeadId.eq(lead_id))
            .filter(Column::Direction.eq(MessageDirection::Outbound.as_str()))
            .count(self.db)
            .await
    }

    /// Phone number id of the lead's most recent message, used by the
    /// reminder scheduler to keep nudges on the channel the conversation
    /// actually happened on.
    pub async fn last_phone_number_id(&self, lead_id: Uuid) -> Result<Option<String>, DbErr> {
        let last = Message::find()
            .filter(Column::LeadId.eq(lead_id))
            .order_by_desc(Column::CreatedAt)
            .limit(1)
            .one(self.db)
            .await?;

        Ok(last.map(|message| message.phone_number_id))
    }
}
