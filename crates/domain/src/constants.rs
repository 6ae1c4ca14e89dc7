//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application. Every threshold here is also the default of the matching
//! configuration field in [`crate::config`].

// Backfill
pub const DEFAULT_BREAK_DURATION_MINUTES: i64 = 60;
pub const DEFAULT_MIN_INACTIVITY_MINUTES: i64 = 60;

// Auto-disconnect
pub const DEFAULT_HARD_CAP_HOURS: i64 = 24;
pub const DEFAULT_ACTIVITY_GRACE_MINUTES: i64 = 15;
pub const DEFAULT_NO_ACTIVITY_CAP_HOURS: i64 = 2;
pub const DEFAULT_OTHER_ROLE_CAP_HOURS: i64 = 12;

// Scheduling (tokio-cron-scheduler uses six fields, seconds first)
pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";
pub const DEFAULT_BACKFILL_CRON: &str = "0 0 3 * * *";
pub const DEFAULT_DISCONNECT_CRON: &str = "0 0 4 * * *";
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

// Persistence
pub const DEFAULT_DB_PATH: &str = "fieldclock.db";
pub const DEFAULT_DB_POOL_SIZE: u32 = 4;

// Notifications
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
