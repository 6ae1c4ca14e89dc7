//! Database implementations

mod columns;
pub mod job_run_repository;
pub mod manager;
pub mod movement_repository;
pub mod preparation_repository;
pub mod session_repository;
pub mod worker_repository;

pub use job_run_repository::*;
pub use manager::*;
pub use movement_repository::*;
pub use preparation_repository::*;
pub use session_repository::*;
pub use worker_repository::*;
