//! Worker identity and roles

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::parse_timezone;

/// Role of a tracked person. Disconnect rules dispatch on this enum, so a
/// new role has to be handled explicitly everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Driver,
    TeamLeader,
    Preparator,
    Admin,
    Direction,
    Unclassified,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::TeamLeader => "team_leader",
            Self::Preparator => "preparator",
            Self::Admin => "admin",
            Self::Direction => "direction",
            Self::Unclassified => "unclassified",
        }
    }

    /// Lenient parse: legacy spellings are accepted and anything unknown
    /// becomes [`WorkerRole::Unclassified`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "driver" => Self::Driver,
            "team_leader" | "teamleader" => Self::TeamLeader,
            "preparator" => Self::Preparator,
            "admin" => Self::Admin,
            "direction" => Self::Direction,
            _ => Self::Unclassified,
        }
    }

    /// Roles whose day follows the start/break/end punch sequence.
    pub fn follows_daily_sequence(&self) -> bool {
        matches!(self, Self::Driver)
    }

    /// Roles that receive reconciliation summaries.
    pub fn receives_reports(&self) -> bool {
        matches!(self, Self::Admin | Self::Direction)
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// A tracked person (driver, preparator, team leader, or office staff).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub role: WorkerRole,
    pub email: Option<String>,
    /// IANA timezone overriding the engine default for day boundaries.
    pub timezone: Option<String>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        full_name: impl Into<String>,
        role: WorkerRole,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            full_name: full_name.into(),
            role,
            email: None,
            timezone: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Resolve the worker's local timezone. An unparsable override falls
    /// back to `default` rather than failing the worker.
    pub fn local_timezone(&self, default: Tz) -> Tz {
        self.timezone.as_deref().and_then(|name| parse_timezone(name).ok()).unwrap_or(default)
    }
}
