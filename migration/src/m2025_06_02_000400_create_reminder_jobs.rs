//! Migration to create the reminder_jobs table.
//!
//! A reminder job is a scheduled nudge for a stalled lead. Jobs move
//! PENDING -> SENT | SKIPPED | FAILED; terminal statuses are never reopened.

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
                    .table(ReminderJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReminderJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReminderJobs::ClientId).uuid().not_null())
                    .col(ColumnDef::new(ReminderJobs::LeadId).uuid().not_null())
                    .col(
                        ColumnDef::new(ReminderJobs::ReminderNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ReminderJobs::ScheduledFor)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReminderJobs::Status)
                            .text()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(ReminderJobs::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ReminderJobs::ErrorText).text().null())
                    .col(
                        ColumnDef::new(ReminderJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ReminderJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reminder_jobs_lead_id")
                            .from(ReminderJobs::Table, ReminderJobs::LeadId)
                            .to(Leads::Table, Leads::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Due-job scan: PENDING jobs in ascending schedule order
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_reminder_jobs_status_scheduled \
                 ON reminder_jobs (status, scheduled_for)"
                    .to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reminder_jobs_lead_status")
                    .table(ReminderJobs::Table)
                    .col(ReminderJobs::LeadId)
                    .col(ReminderJobs::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_reminder_jobs_status_scheduled")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_reminder_jobs_lead_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ReminderJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReminderJobs {
    Table,
    Id,
    ClientId,
    LeadId,
    ReminderNumber,
    ScheduledFor,
    Status,
    SentAt,
    ErrorText,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
}
