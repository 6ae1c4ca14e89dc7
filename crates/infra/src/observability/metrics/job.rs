//! Per-job execution metrics
//!
//! One `JobMetrics` instance is kept for each reconciliation job. Counters
//! are independent, so `Relaxed` ordering is enough for writes; snapshots
//! use `SeqCst` loads so the average is computed from a consistent pair.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::observability::{MetricsError, MetricsResult};

/// Execution counters for one scheduled job
#[derive(Debug, Default)]
pub struct JobMetrics {
    invocations: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    skipped_overlaps: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Point-in-time copy of a job's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobMetricsSnapshot {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub skipped_overlaps: u64,
    pub total_duration_ms: u64,
}

impl JobMetricsSnapshot {
    /// True when this process never triggered the job.
    pub fn is_empty(&self) -> bool {
        self.invocations == 0 && self.skipped_overlaps == 0
    }
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A run started (scheduled or manual).
    pub fn record_invocation(&self) -> MetricsResult<()> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// A run finished with every worker processed.
    pub fn record_success(&self, duration: Duration) -> MetricsResult<()> {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.add_duration(duration)
    }

    /// A run finished with per-worker errors, was interrupted, or failed
    /// outright.
    pub fn record_failure(&self, duration: Duration) -> MetricsResult<()> {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.add_duration(duration)
    }

    pub fn record_timeout(&self) -> MetricsResult<()> {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// A cron trigger fired while the previous run was still executing.
    pub fn record_skipped_overlap(&self) -> MetricsResult<()> {
        self.skipped_overlaps.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn add_duration(&self, duration: Duration) -> MetricsResult<()> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        Ok(())
    }

    pub fn snapshot(&self) -> JobMetricsSnapshot {
        JobMetricsSnapshot {
            invocations: self.invocations.load(Ordering::SeqCst),
            successes: self.successes.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            timeouts: self.timeouts.load(Ordering::SeqCst),
            skipped_overlaps: self.skipped_overlaps.load(Ordering::SeqCst),
            total_duration_ms: self.total_duration_ms.load(Ordering::SeqCst),
        }
    }

    /// Mean duration of finished runs.
    ///
    /// Returns `MetricsError::EmptyData` if no run has finished yet.
    pub fn average_duration_ms(&self) -> MetricsResult<u64> {
        let snapshot = self.snapshot();
        let finished = snapshot.successes + snapshot.failures;
        if finished == 0 {
            return Err(MetricsError::EmptyData { metric: "average duration" });
        }
        Ok(snapshot.total_duration_ms / finished)
    }
}
