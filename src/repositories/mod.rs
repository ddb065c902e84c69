//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access
//! with tenant-aware methods and conditional state transitions.

pub mod channels;
pub mod clients;
pub mod events;
pub mod flows;
pub mod leads;
pub mod messages;
pub mod reminders;

pub use channels::ChannelRepository;
pub use clients::ClientRepository;
pub use events::EventRepository;
pub use flows::FlowRepository;
pub use leads::{LeadRepository, NewLead};
pub use messages::{InsertOutcome, MessageRepository, NewMessage};
pub use reminders::ReminderJobRepository;
