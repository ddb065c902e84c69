//! Migration to create the flow_steps table.
//!
//! A step is one prompt node in a flow tree, ordered by step_order which also
//! drives the linear next-step fallback.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FlowSteps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FlowSteps::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FlowSteps::FlowId).uuid().not_null())
                    .col(ColumnDef::new(FlowSteps::StepOrder).integer().not_null())
                    .col(ColumnDef::new(FlowSteps::PromptText).text().not_null())
                    .col(
                        ColumnDef::new(FlowSteps::AllowFreeText)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FlowSteps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_flow_steps_flow_id")
                            .from(FlowSteps::Table, FlowSteps::FlowId)
                            .to(ClientFlows::Table, ClientFlows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flow_steps_flow_order")
                    .table(FlowSteps::Table)
                    .col(FlowSteps::FlowId)
                    .col(FlowSteps::StepOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_flow_steps_flow_order").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(FlowSteps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FlowSteps {
    Table,
    Id,
    FlowId,
    StepOrder,
    PromptText,
    AllowFreeText,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ClientFlows {
    Table,
    Id,
}
