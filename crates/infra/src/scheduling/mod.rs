//! Scheduling infrastructure for the nightly reconciliation jobs
//!
//! The scheduler follows the runtime rules used across this crate:
//! - Explicit lifecycle management (start/stop/shutdown)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations
//! - Structured tracing with `JobMetrics` integration

pub mod error;
pub mod reconciliation_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use reconciliation_scheduler::{
    JobStatus, ReconciliationScheduler, ReconciliationSchedulerConfig, RunState, SchedulerStatus,
};
