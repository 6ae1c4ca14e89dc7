//! Scheduler error types

use fieldclock_domain::FieldClockError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// Failed to create scheduler
    #[error("Failed to create scheduler: {0}")]
    CreationFailed(String),

    /// Failed to start scheduler
    #[error("Failed to start scheduler: {0}")]
    StartFailed(String),

    /// Failed to stop scheduler
    #[error("Failed to stop scheduler: {0}")]
    StopFailed(String),

    /// Failed to register job
    #[error("Failed to register job: {0}")]
    JobRegistrationFailed(String),

    /// A run could not start or aborted before producing a summary
    #[error("Job failed: {0}")]
    JobFailed(FieldClockError),

    /// The shared job lease could not be read or written
    #[error("Job lease unavailable: {0}")]
    Lease(FieldClockError),

    /// Operation timed out
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),

    /// The configured timezone is not a known IANA name
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                FieldClockError::InvalidInput(err.to_string())
            }
            SchedulerError::InvalidTimezone(_) => FieldClockError::Config(err.to_string()),
            SchedulerError::JobFailed(inner) | SchedulerError::Lease(inner) => inner,
            _ => FieldClockError::Internal(err.to_string()),
        };
        InfraError(domain_err)
    }
}

impl From<SchedulerError> for FieldClockError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
