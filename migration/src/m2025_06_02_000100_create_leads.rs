//! Migration to create the leads table.
//!
//! A lead is one end-user conversation session: status, flow position, score,
//! streak counters, and the typed reentry routing sub-state.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Leads::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Leads::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Leads::ClientId).uuid().not_null())
                    .col(ColumnDef::new(Leads::WaUserId).text().not_null())
                    .col(ColumnDef::new(Leads::WaProfileName).text().null())
                    .col(
                        ColumnDef::new(Leads::ConversationStatus)
                            .text()
                            .not_null()
                            .default("ACTIVE"),
                    )
                    .col(ColumnDef::new(Leads::HumanRequiredReason).text().null())
                    .col(
                        ColumnDef::new(Leads::RoutingState)
                            .text()
                            .not_null()
                            .default("ROUTING"),
                    )
                    .col(ColumnDef::new(Leads::Score).integer().not_null().default(0))
                    .col(ColumnDef::new(Leads::FlowId).uuid().null())
                    .col(ColumnDef::new(Leads::CurrentStepId).uuid().null())
                    .col(
                        ColumnDef::new(Leads::RemindersSent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Leads::IrrelevantStreak)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Leads::FreeTextSummary).text().null())
                    .col(ColumnDef::new(Leads::ExtractedFields).json_binary().null())
                    .col(
                        ColumnDef::new(Leads::NotifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Leads::LastUserMessageAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Leads::LastBotMessageAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Leads::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Leads::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Leads::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_leads_client_id")
                            .from(Leads::Table, Leads::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Open-lead lookups scan by (client, user, status); closed-lead cooldown
        // checks additionally order by closed_at
        manager
            .create_index(
                Index::create()
                    .name("idx_leads_client_user_status")
                    .table(Leads::Table)
                    .col(Leads::ClientId)
                    .col(Leads::WaUserId)
                    .col(Leads::ConversationStatus)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_leads_client_user_status").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Leads::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
    ClientId,
    WaUserId,
    WaProfileName,
    ConversationStatus,
    HumanRequiredReason,
    RoutingState,
    Score,
    FlowId,
    CurrentStepId,
    RemindersSent,
    IrrelevantStreak,
    FreeTextSummary,
    ExtractedFields,
    NotifiedAt,
    LastUserMessageAt,
    LastBotMessageAt,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
}
