//! Database migrations for the Leadflow engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_clients;
mod m2025_06_01_000002_create_client_channels;
mod m2025_06_01_000003_create_client_flows;
mod m2025_06_01_000004_create_flow_steps;
mod m2025_06_01_000005_create_flow_step_options;
mod m2025_06_02_000100_create_leads;
mod m2025_06_02_000200_create_messages;
mod m2025_06_02_000300_create_lead_step_events;
mod m2025_06_02_000400_create_reminder_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_clients::Migration),
            Box::new(m2025_06_01_000002_create_client_channels::Migration),
            Box::new(m2025_06_01_000003_create_client_flows::Migration),
            Box::new(m2025_06_01_000004_create_flow_steps::Migration),
            Box::new(m2025_06_01_000005_create_flow_step_options::Migration),
            Box::new(m2025_06_02_000100_create_leads::Migration),
            Box::new(m2025_06_02_000200_create_messages::Migration),
            Box::new(m2025_06_02_000300_create_lead_step_events::Migration),
            Box::new(m2025_06_02_000400_create_reminder_jobs::Migration),
        ]
    }
}
