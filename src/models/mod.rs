//! # Data Models
//!
//! This module contains all the data models used throughout the Leadflow
//! engine: SeaORM entities for the persistent tables plus the typed status
//! vocabularies stored in their text columns.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod channel;
pub mod client;
pub mod flow;
pub mod flow_step;
pub mod flow_step_option;
pub mod lead;
pub mod lead_step_event;
pub mod message;
pub mod reminder_job;

pub use channel::Entity as ClientChannel;
pub use client::Entity as Client;
pub use flow::Entity as ClientFlow;
pub use flow_step::Entity as FlowStep;
pub use flow_step_option::Entity as FlowStepOption;
pub use lead::Entity as Lead;
pub use lead_step_event::Entity as LeadStepEvent;
pub use message::Entity as Message;
pub use reminder_job::Entity as ReminderJob;

pub use lead::{ConversationStatus, EscalationReason, RoutingState};
pub use lead_step_event::MappingSource;
pub use message::MessageDirection;
pub use reminder_job::ReminderJobStatus;

/// Convert a UTC instant into the fixed-offset representation SeaORM stores.
pub fn to_db_time(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.fixed_offset()
}

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "leadflow".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
