//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `FIELDCLOCK_DB_PATH` is not set, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `FIELDCLOCK_DB_PATH`: Database file path (required for env loading)
//! - `FIELDCLOCK_DB_POOL_SIZE`: Connection pool size
//! - `FIELDCLOCK_SCHEDULER_ENABLED`: Whether the nightly jobs run (true/false)
//! - `FIELDCLOCK_TIMEZONE`: IANA timezone for cron and day boundaries
//! - `FIELDCLOCK_BACKFILL_CRON` / `FIELDCLOCK_DISCONNECT_CRON`: six-field cron
//!   expressions
//! - `FIELDCLOCK_JOB_TIMEOUT_SECS`: Upper bound for one run
//! - `FIELDCLOCK_BREAK_DURATION_MINUTES`, `FIELDCLOCK_MIN_INACTIVITY_MINUTES`
//! - `FIELDCLOCK_HARD_CAP_HOURS`, `FIELDCLOCK_ACTIVITY_GRACE_MINUTES`,
//!   `FIELDCLOCK_NO_ACTIVITY_CAP_HOURS`, `FIELDCLOCK_OTHER_ROLE_CAP_HOURS`
//! - `FIELDCLOCK_NOTIFICATIONS_ENABLED`, `FIELDCLOCK_WEBHOOK_URL`,
//!   `FIELDCLOCK_WEBHOOK_TIMEOUT_SECS`
//! - `FIELDCLOCK_LOG_LEVEL`, `FIELDCLOCK_LOG_FORMAT` (`pretty` or `json`)
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./fieldclock.json` or `./fieldclock.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fieldclock_domain::{Config, FieldClockError, LogFormat, Result};

const PREFIX: &str = "FIELDCLOCK_";

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `FieldClockError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `FIELDCLOCK_DB_PATH` must be set; every other variable is optional.
///
/// # Errors
/// Returns `FieldClockError::Config` if the path is missing or a value does
/// not parse.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    config.database.path = env_var("DB_PATH")?;

    if let Some(size) = env_parse("DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }

    let scheduler = &mut config.scheduler;
    scheduler.enabled = env_bool("SCHEDULER_ENABLED", scheduler.enabled);
    if let Some(tz) = env_opt("TIMEZONE") {
        scheduler.timezone = tz;
    }
    if let Some(cron) = env_opt("BACKFILL_CRON") {
        scheduler.backfill_cron = cron;
    }
    if let Some(cron) = env_opt("DISCONNECT_CRON") {
        scheduler.disconnect_cron = cron;
    }
    if let Some(secs) = env_parse("JOB_TIMEOUT_SECS")? {
        scheduler.job_timeout_secs = secs;
    }

    if let Some(minutes) = env_parse("BREAK_DURATION_MINUTES")? {
        config.backfill.break_duration_minutes = minutes;
    }
    if let Some(minutes) = env_parse("MIN_INACTIVITY_MINUTES")? {
        config.backfill.min_inactivity_minutes = minutes;
    }

    let disconnect = &mut config.disconnect;
    if let Some(hours) = env_parse("HARD_CAP_HOURS")? {
        disconnect.hard_cap_hours = hours;
    }
    if let Some(minutes) = env_parse("ACTIVITY_GRACE_MINUTES")? {
        disconnect.activity_grace_minutes = minutes;
    }
    if let Some(hours) = env_parse("NO_ACTIVITY_CAP_HOURS")? {
        disconnect.no_activity_cap_hours = hours;
    }
    if let Some(hours) = env_parse("OTHER_ROLE_CAP_HOURS")? {
        disconnect.other_role_cap_hours = hours;
    }

    let notifications = &mut config.notifications;
    notifications.enabled = env_bool("NOTIFICATIONS_ENABLED", notifications.enabled);
    notifications.webhook_url = env_opt("WEBHOOK_URL").or(notifications.webhook_url.take());
    if let Some(secs) = env_parse("WEBHOOK_TIMEOUT_SECS")? {
        notifications.webhook_timeout_secs = secs;
    }

    if let Some(level) = env_opt("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env_opt("LOG_FORMAT") {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(FieldClockError::Config(format!("Invalid log format: {other}")));
            }
        };
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `FieldClockError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FieldClockError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FieldClockError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FieldClockError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content. Format is detected by file
/// extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FieldClockError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FieldClockError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(FieldClockError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["config.json", "config.toml", "fieldclock.json", "fieldclock.toml"];
    const PARENTS: [&str; 4] =
        ["../config.json", "../config.toml", "../../config.json", "../../config.toml"];

    let mut bases = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        bases.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        bases.push(exe_dir);
    }

    bases
        .iter()
        .flat_map(|base| NAMES.iter().chain(PARENTS.iter()).map(move |name| base.join(name)))
        .find(|path| path.exists())
}

fn env_key(key: &str) -> String {
    format!("{PREFIX}{key}")
}

/// Required environment variable.
fn env_var(key: &str) -> Result<String> {
    let name = env_key(key);
    std::env::var(&name).map_err(|_| {
        FieldClockError::Config(format!("Missing required environment variable: {name}"))
    })
}

/// Optional, non-empty environment variable.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(env_key(key)).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                FieldClockError::Config(format!("Invalid value for {}: {e}", env_key(key)))
            })
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
