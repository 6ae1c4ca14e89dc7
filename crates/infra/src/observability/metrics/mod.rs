//! Metrics collection modules
//!
//! Thread-safe metrics for the scheduled jobs.

pub mod job;

pub use job::{JobMetrics, JobMetricsSnapshot};
