//! Observability infrastructure for metrics and logging
//!
//! - `logging`: one-time `tracing-subscriber` initialisation (pretty or JSON)
//! - `metrics`: thread-safe counters for the reconciliation jobs
//!
//! ## Error Handling
//!
//! Record methods return `MetricsResult<()>` and currently always succeed.
//! Callers log and continue on failure:
//!
//! ```rust
//! use fieldclock_infra::observability::metrics::JobMetrics;
//!
//! let metrics = JobMetrics::new();
//! if let Err(e) = metrics.record_invocation() {
//!     tracing::warn!("Failed to record metric: {}", e);
//! }
//! ```

pub mod logging;
pub mod metrics;

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set - cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "average")
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
