//! Migration to create the clients table.
//!
//! This migration creates the baseline clients table with UUID primary key,
//! scoring threshold, and notification/handoff contact fields.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Clients::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Clients::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Clients::Name).text().not_null())
                    .col(
                        ColumnDef::new(Clients::ScoreThreshold)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(ColumnDef::new(Clients::NotificationEmail).text().not_null())
                    .col(ColumnDef::new(Clients::HumanForwardNumber).text().null())
                    .col(
                        ColumnDef::new(Clients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Clients::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
    Name,
    ScoreThreshold,
    NotificationEmail,
    HumanForwardNumber,
    CreatedAt,
}
