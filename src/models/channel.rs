//! ClientChannel entity model
//!
//! This module contains the SeaORM entity model for the client_channels table.
//! A channel binds a WhatsApp phone number id to a client and carries the
//! AES-GCM encrypted Cloud API access token and webhook signing secret.

use super::client::Entity as Client;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// ClientChannel entity representing a bound messaging identity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "client_channels")]
pub struct Model {
    /// Unique identifier for the channel (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Client identifier for multi-tenancy
    pub client_id: Uuid,

    /// WhatsApp Cloud API phone number id this channel receives traffic for
    pub phone_number_id: String,

    /// Encrypted Cloud API access token (AAD-bound, see crypto module)
    pub access_token_ciphertext: Vec<u8>,

    /// Encrypted webhook signing secret (AAD-bound, see crypto module)
    pub signing_secret_ciphertext: Vec<u8>,

    /// Inactive channels are ignored by the inbound pipeline
    pub is_active: bool,

    /// Timestamp when the channel was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the channel was last updated (secret rotation)
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
