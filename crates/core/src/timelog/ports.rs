//! Port interfaces for attendance reconciliation
//!
//! These traits define the boundaries between core business logic
//! and infrastructure implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldclock_domain::{
    Movement, Preparation, Result, RunSummary, Session, SessionClosure, Worker, WorkerRole,
};
use uuid::Uuid;

/// Trait for reading and writing attendance sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Sessions of one worker whose start time falls in `[start, end]`,
    /// ordered by start time.
    async fn find_sessions_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>>;

    /// Every currently active session, across all workers.
    async fn find_active_sessions(&self) -> Result<Vec<Session>>;

    /// The active session of one worker, if any.
    async fn find_active_session(&self, worker_id: &str) -> Result<Option<Session>>;

    /// Insert a new session. Inserting a second active session for the same
    /// worker fails with `FieldClockError::Conflict`.
    async fn insert_session(&self, session: &Session) -> Result<()>;

    /// Close an active session.
    ///
    /// Returns `Ok(false)` without writing when the session is no longer
    /// active (closed concurrently by another path).
    async fn close_session(&self, id: Uuid, closure: &SessionClosure) -> Result<bool>;
}

/// Read-only access to vehicle movements
#[async_trait]
pub trait MovementRepository: Send + Sync {
    /// Movements of one worker whose departure, arrival, creation or last
    /// update falls in `[start, end]`.
    async fn find_movements_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movement>>;

    /// Most recently completed movement, by completion time.
    async fn find_last_completed_movement(&self, worker_id: &str) -> Result<Option<Movement>>;

    /// Whether the worker has a movement being prepared or driven.
    async fn has_open_movement(&self, worker_id: &str) -> Result<bool>;
}

/// Read-only access to vehicle preparations
#[async_trait]
pub trait PreparationRepository: Send + Sync {
    /// Preparations of one worker whose start, end, creation or last update
    /// falls in `[start, end]`.
    async fn find_preparations_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Preparation>>;

    /// Most recently completed preparation, by completion time.
    async fn find_last_completed_preparation(&self, worker_id: &str)
        -> Result<Option<Preparation>>;

    /// Whether the worker has a preparation in progress.
    async fn has_open_preparation(&self, worker_id: &str) -> Result<bool>;
}

/// Lookup of tracked people
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    /// Workers holding any of the given roles.
    async fn list_workers_by_roles(&self, roles: &[WorkerRole]) -> Result<Vec<Worker>>;

    /// A single worker by id.
    async fn find_worker(&self, worker_id: &str) -> Result<Option<Worker>>;
}

/// Delivery of run summaries to administrative recipients
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one summary. Failures are reported, never retried.
    async fn send_summary(&self, summary: &RunSummary, recipients: &[Worker]) -> Result<()>;
}
