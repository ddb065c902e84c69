//! # Client Repository
//!
//! Read-only access to client (tenant) rows consumed by the inbound pipeline.

use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use uuid::Uuid;

use crate::models::client::{Entity as Client, Model};

/// Repository for Client database operations
pub struct ClientRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ClientRepository<'a> {
    /// Create a new ClientRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Point lookup by id. A missing client is a normal, reportable condition.
    pub async fn find_by_id(&self, client_id: Uuid) -> Result<Option<Model>, DbErr> {
        Client::find_by_id(client_id).one(self.db).await
    }
}
