//! Migration to create the lead_step_events table.
//!
//! Append-only audit log of routing decisions: one row per option resolution
//! attempt, matched or not. Also backs the same-step loop safety counter.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LeadStepEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LeadStepEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LeadStepEvents::ClientId).uuid().not_null())
                    .col(ColumnDef::new(LeadStepEvents::LeadId).uuid().not_null())
                    .col(ColumnDef::new(LeadStepEvents::FlowId).uuid().not_null())
                    .col(ColumnDef::new(LeadStepEvents::StepId).uuid().not_null())
                    .col(ColumnDef::new(LeadStepEvents::RawUserText).text().not_null())
                    .col(ColumnDef::new(LeadStepEvents::SelectedOptionId).uuid().null())
                    .col(ColumnDef::new(LeadStepEvents::MappingSource).text().not_null())
                    .col(ColumnDef::new(LeadStepEvents::AiSummary).text().null())
                    .col(
                        ColumnDef::new(LeadStepEvents::AiOutOfScope)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(LeadStepEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lead_step_events_lead_id")
                            .from(LeadStepEvents::Table, LeadStepEvents::LeadId)
                            .to(Leads::Table, Leads::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lead_step_events_lead_step")
                    .table(LeadStepEvents::Table)
                    .col(LeadStepEvents::LeadId)
                    .col(LeadStepEvents::StepId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_lead_step_events_lead_step")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(LeadStepEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LeadStepEvents {
    Table,
    Id,
    ClientId,
    LeadId,
    FlowId,
    StepId,
    RawUserText,
    SelectedOptionId,
    MappingSource,
    AiSummary,
    AiOutOfScope,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
}
