//! # FieldClock Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite event store (sessions, movements, preparations, workers)
//! - Notification senders (structured log, JSON webhook)
//! - The cron-based reconciliation scheduler
//! - Configuration loading, logging and job metrics
//!
//! ## Architecture
//! - Implements traits defined in `fieldclock-core`
//! - Depends on `fieldclock-domain` and `fieldclock-core`
//! - Contains all "impure" code (I/O, clocks, HTTP)

pub mod config;
pub mod database;
pub mod errors;
pub mod notifications;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use notifications::{sender_from_config, LogNotificationSender, WebhookNotificationSender};
pub use scheduling::{ReconciliationScheduler, ReconciliationSchedulerConfig, SchedulerError};
