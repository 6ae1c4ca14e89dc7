//! # FieldClock Domain
//!
//! Business domain types and models for FieldClock.
//!
//! This crate contains:
//! - Attendance data types (Session, Worker, Movement, Preparation)
//! - Reconciliation report types shared by the engine and its adapters
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants (thresholds and defaults)
//!
//! ## Architecture
//! - No dependencies on other FieldClock crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
