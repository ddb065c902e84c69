//! Migration to create the messages table.
//!
//! Stores every inbound and outbound text. The unique index on
//! (lead_id, wa_message_id) is the idempotency guard for duplicate webhook
//! deliveries.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Messages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Messages::ClientId).uuid().not_null())
                    .col(ColumnDef::new(Messages::LeadId).uuid().not_null())
                    .col(ColumnDef::new(Messages::Direction).text().not_null())
                    .col(ColumnDef::new(Messages::PhoneNumberId).text().not_null())
                    .col(ColumnDef::new(Messages::WaMessageId).text().null())
                    .col(ColumnDef::new(Messages::TextContent).text().not_null())
                    .col(ColumnDef::new(Messages::RawPayload).json_binary().null())
                    .col(
                        ColumnDef::new(Messages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_lead_id")
                            .from(Messages::Table, Messages::LeadId)
                            .to(Leads::Table, Leads::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Partial unique index: NULL wa_message_id rows (outbound without a
        // provider id) must not collide, so restrict the guard to non-null ids
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_messages_lead_wa_message_id \
                 ON messages (lead_id, wa_message_id) WHERE wa_message_id IS NOT NULL"
                    .to_string(),
            ))
            .await?;

        // Rate-limit window counts and transcript views scan by lead/direction/time
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_lead_direction_created")
                    .table(Messages::Table)
                    .col(Messages::LeadId)
                    .col(Messages::Direction)
                    .col(Messages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_messages_lead_direction_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("uq_messages_lead_wa_message_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    ClientId,
    LeadId,
    Direction,
    PhoneNumberId,
    WaMessageId,
    TextContent,
    RawPayload,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
}
