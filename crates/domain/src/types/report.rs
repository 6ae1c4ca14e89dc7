//! Reconciliation run summaries
//!
//! These are what the scheduler hands to the notification sender and what
//! administrative triggers return.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FieldClockError;

use super::session::{AutoGenerationReason, SessionType};
use super::worker::{Worker, WorkerRole};

/// The two nightly phases of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Backfill,
    Disconnect,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backfill" => Ok(Self::Backfill),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(FieldClockError::InvalidInput(format!("unknown job: {other}"))),
        }
    }
}

/// Final state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    PartialFailure,
    /// Shutdown was requested; the run stopped after its current worker.
    Interrupted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartialFailure => "partial_failure",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_run(error_count: usize, interrupted: bool) -> Self {
        if interrupted {
            Self::Interrupted
        } else if error_count > 0 {
            Self::PartialFailure
        } else {
            Self::Completed
        }
    }
}

impl FromStr for RunOutcome {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "partial_failure" => Ok(Self::PartialFailure),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(FieldClockError::InvalidInput(format!("unknown run outcome: {other}"))),
        }
    }
}

/// Identity fields copied into reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRef {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

impl From<&Worker> for WorkerRef {
    fn from(worker: &Worker) -> Self {
        Self {
            id: worker.id.clone(),
            username: worker.username.clone(),
            full_name: worker.full_name.clone(),
        }
    }
}

/// A per-worker failure isolated from the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub worker_id: String,
    pub worker_name: Option<String>,
    pub message: String,
}

/// One synthesized punch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub session_type: SessionType,
    pub time: DateTime<Utc>,
    pub reason: AutoGenerationReason,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCorrections {
    pub worker: WorkerRef,
    pub items: Vec<Correction>,
}

/// Result of one backfill run over a processed day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    pub day: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workers_processed: usize,
    /// Workers with no sessions and no operational activity that day.
    pub workers_skipped: usize,
    pub corrections: Vec<WorkerCorrections>,
    pub total_corrections: usize,
    pub errors: Vec<WorkerFailure>,
    pub outcome: RunOutcome,
}

/// One closed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnection {
    pub worker: WorkerRef,
    pub role: WorkerRole,
    pub session_id: Uuid,
    pub reason: String,
}

/// Result of one disconnect sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub disconnected: usize,
    pub retained: usize,
    /// Sessions another path closed between the read and the write.
    pub already_closed: usize,
    pub disconnections: Vec<Disconnection>,
    pub errors: Vec<WorkerFailure>,
    pub outcome: RunOutcome,
}

/// Summary of either phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum RunSummary {
    Backfill(BackfillReport),
    Disconnect(DisconnectReport),
}

impl RunSummary {
    pub fn job(&self) -> JobKind {
        match self {
            Self::Backfill(_) => JobKind::Backfill,
            Self::Disconnect(_) => JobKind::Disconnect,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match self {
            Self::Backfill(report) => report.outcome,
            Self::Disconnect(report) => report.outcome,
        }
    }

    pub fn errors(&self) -> &[WorkerFailure] {
        match self {
            Self::Backfill(report) => &report.errors,
            Self::Disconnect(report) => &report.errors,
        }
    }
}
