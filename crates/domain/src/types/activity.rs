//! Operational events consumed (read-only) by the reconciliation engine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FieldClockError;

/// Lifecycle of a vehicle movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    Pending,
    Assigned,
    Preparing,
    InProgress,
    Completed,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Preparing => "preparing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for MovementStatus {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "preparing" => Ok(Self::Preparing),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(FieldClockError::InvalidInput(format!("unknown movement status: {other}"))),
        }
    }
}

/// A vehicle movement performed by a driver or team leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: String,
    pub worker_id: String,
    pub status: MovementStatus,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movement {
    /// Work is currently happening on this movement.
    pub fn is_open(&self) -> bool {
        matches!(self.status, MovementStatus::Preparing | MovementStatus::InProgress)
    }

    pub fn is_completed(&self) -> bool {
        self.status == MovementStatus::Completed
    }

    /// Arrival time, falling back to the last modification.
    pub fn completion_time(&self) -> DateTime<Utc> {
        self.arrival_time.unwrap_or(self.updated_at)
    }
}

/// Lifecycle of a vehicle preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl PreparationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PreparationStatus {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "pending" | "not_started" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => {
                Err(FieldClockError::InvalidInput(format!("unknown preparation status: {other}")))
            }
        }
    }
}

/// A vehicle preparation performed by a preparator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preparation {
    pub id: String,
    pub worker_id: String,
    pub status: PreparationStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preparation {
    pub fn is_open(&self) -> bool {
        self.status == PreparationStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == PreparationStatus::Completed
    }

    /// End time, falling back to the last modification.
    pub fn completion_time(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.updated_at)
    }
}
