//! Configuration structures
//!
//! Every section carries serde defaults so that a partial file (or an empty
//! one) still yields a usable configuration.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACTIVITY_GRACE_MINUTES, DEFAULT_BACKFILL_CRON, DEFAULT_BREAK_DURATION_MINUTES,
    DEFAULT_DB_PATH, DEFAULT_DB_POOL_SIZE, DEFAULT_DISCONNECT_CRON, DEFAULT_HARD_CAP_HOURS,
    DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_MIN_INACTIVITY_MINUTES, DEFAULT_NO_ACTIVITY_CAP_HOURS,
    DEFAULT_OTHER_ROLE_CAP_HOURS, DEFAULT_TIMEZONE, DEFAULT_WEBHOOK_TIMEOUT_SECS,
};
use crate::errors::{FieldClockError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub backfill: BackfillPolicy,
    pub disconnect: DisconnectPolicy,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.timezone()?;
        if self.database.pool_size == 0 {
            return Err(FieldClockError::Config("database.pool_size must be at least 1".into()));
        }
        if self.backfill.break_duration_minutes <= 0 {
            return Err(FieldClockError::Config(
                "backfill.break_duration_minutes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// SQLite event store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: DEFAULT_DB_PATH.into(), pool_size: DEFAULT_DB_POOL_SIZE }
    }
}

/// Nightly job schedules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// IANA timezone used both for cron evaluation and day boundaries.
    pub timezone: String,
    pub backfill_cron: String,
    pub disconnect_cron: String,
    pub job_timeout_secs: u64,
}

impl SchedulerConfig {
    /// Parse the configured timezone.
    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: DEFAULT_TIMEZONE.into(),
            backfill_cron: DEFAULT_BACKFILL_CRON.into(),
            disconnect_cron: DEFAULT_DISCONNECT_CRON.into(),
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

/// Thresholds for synthesizing missing punches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillPolicy {
    /// Fixed length of a synthesized break.
    pub break_duration_minutes: i64,
    /// Shortest idle gap that counts as an unrecorded break.
    pub min_inactivity_minutes: i64,
}

impl Default for BackfillPolicy {
    fn default() -> Self {
        Self {
            break_duration_minutes: DEFAULT_BREAK_DURATION_MINUTES,
            min_inactivity_minutes: DEFAULT_MIN_INACTIVITY_MINUTES,
        }
    }
}

/// Thresholds for closing orphaned sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectPolicy {
    /// Applies to every role before any role rule.
    pub hard_cap_hours: i64,
    /// Allowed idle time after the last completed movement or preparation.
    pub activity_grace_minutes: i64,
    /// Cap for field roles that never completed any activity.
    pub no_activity_cap_hours: i64,
    /// Cap for administrative and unclassified roles.
    pub other_role_cap_hours: i64,
}

impl Default for DisconnectPolicy {
    fn default() -> Self {
        Self {
            hard_cap_hours: DEFAULT_HARD_CAP_HOURS,
            activity_grace_minutes: DEFAULT_ACTIVITY_GRACE_MINUTES,
            no_activity_cap_hours: DEFAULT_NO_ACTIVITY_CAP_HOURS,
            other_role_cap_hours: DEFAULT_OTHER_ROLE_CAP_HOURS,
        }
    }
}

/// Summary delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// When unset, summaries are only written to the log.
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true, webhook_url: None, webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::Pretty }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| FieldClockError::Config(format!("Invalid timezone '{name}': {e}")))
}
