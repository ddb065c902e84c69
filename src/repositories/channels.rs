//! # Channel Repository
//!
//! Channel lookups for the inbound pipeline (by phone number id) and the
//! reminder scheduler (by client). Inactive channels are never returned.

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::models::channel::{Column, Entity as ClientChannel, Model};

/// Repository for ClientChannel database operations
pub struct ChannelRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ChannelRepository<'a> {
    /// Create a new ChannelRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Resolve the active channel an inbound delivery arrived on.
    pub async fn find_active_by_phone_number(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        ClientChannel::find()
            .filter(Column::PhoneNumberId.eq(phone_number_id))
            .filter(Column::IsActive.eq(true))
            .one(self.db)
            .await
    }

    /// Resolve a specific active channel of a client.
    pub async fn find_active_for_client_phone(
        &self,
        client_id: Uuid,
        phone_number_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        ClientChannel::find()
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::PhoneNumberId.eq(phone_number_id))
            .filter(Column::IsActive.eq(true))
            .one(self.db)
            .await
    }

    /// Any active channel of a client; fallback when a lead has no message
    /// history pointing at a specific phone number.
    pub async fn find_any_active_for_client(
        &self,
        client_id: Uuid,
    ) -> Result<Option<Model>, DbErr> {
        ClientChannel::find()
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::IsActive.eq(true))
            .limit(1)
            .one(self.db)
            .await
    }
}
