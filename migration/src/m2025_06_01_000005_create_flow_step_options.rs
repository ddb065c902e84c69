//! Migration to create the flow_step_options table.
//!
//! An option is a selectable edge out of a step. next_step_id is the optional
//! explicit graph edge; when null, routing falls back to next step by order.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FlowStepOptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FlowStepOptions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FlowStepOptions::StepId).uuid().not_null())
                    .col(
                        ColumnDef::new(FlowStepOptions::OptionOrder)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FlowStepOptions::OptionCode).text().not_null())
                    .col(ColumnDef::new(FlowStepOptions::LabelText).text().not_null())
                    .col(
                        ColumnDef::new(FlowStepOptions::ScoreDelta)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FlowStepOptions::IsContactHuman)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FlowStepOptions::IsTerminal)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(FlowStepOptions::NextStepId).uuid().null())
                    .col(
                        ColumnDef::new(FlowStepOptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_flow_step_options_step_id")
                            .from(FlowStepOptions::Table, FlowStepOptions::StepId)
                            .to(FlowSteps::Table, FlowSteps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flow_step_options_step_order")
                    .table(FlowStepOptions::Table)
                    .col(FlowStepOptions::StepId)
                    .col(FlowStepOptions::OptionOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_flow_step_options_step_order")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(FlowStepOptions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FlowStepOptions {
    Table,
    Id,
    StepId,
    OptionOrder,
    OptionCode,
    LabelText,
    ScoreDelta,
    IsContactHuman,
    IsTerminal,
    NextStepId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FlowSteps {
    Table,
    Id,
}
