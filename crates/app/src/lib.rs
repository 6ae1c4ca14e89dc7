//! # FieldClock Application
//!
//! Wires the SQLite store, reconciliation service and scheduler together
//! and exposes the command-line entry points used by the `fieldclock`
//! binary.

pub mod commands;
pub mod context;

pub use commands::{execute, Cli, Commands};
pub use context::AppContext;
