//! Migration to create the client_flows table.
//!
//! A flow is a versioned conversation tree for a client; at most one flow per
//! client is active at a time (enforced at the repository layer on activation).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClientFlows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClientFlows::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ClientFlows::ClientId).uuid().not_null())
                    .col(ColumnDef::new(ClientFlows::Name).text().not_null())
                    .col(
                        ColumnDef::new(ClientFlows::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ClientFlows::WelcomeMessage).text().not_null())
                    .col(
                        ColumnDef::new(ClientFlows::MaxReminders)
                            .integer()
                            .not_null()
                            .default(2),
                    )
                    .col(
                        ColumnDef::new(ClientFlows::ReminderDelayMinutes)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(ClientFlows::MaxIrrelevantStreak)
                            .integer()
                            .not_null()
                            .default(2),
                    )
                    .col(
                        ColumnDef::new(ClientFlows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_client_flows_client_id")
                            .from(ClientFlows::Table, ClientFlows::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_client_flows_client_active")
                    .table(ClientFlows::Table)
                    .col(ClientFlows::ClientId)
                    .col(ClientFlows::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_client_flows_client_active")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ClientFlows::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClientFlows {
    Table,
    Id,
    ClientId,
    Name,
    IsActive,
    WelcomeMessage,
    MaxReminders,
    ReminderDelayMinutes,
    MaxIrrelevantStreak,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
}
