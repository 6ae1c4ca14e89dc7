//! In-memory implementations of the core ports
//!
//! One `InMemoryStore` backs every port so tests can seed data once and
//! inspect writes afterwards. Reads and writes for selected workers can be
//! made to fail to exercise per-worker error isolation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldclock_core::{
    MovementRepository, NotificationSender, PreparationRepository, SessionRepository,
    WorkerDirectory,
};
use fieldclock_domain::{
    FieldClockError, Movement, Preparation, Result as DomainResult, RunSummary, Session,
    SessionClosure, Worker, WorkerRole,
};
use uuid::Uuid;

#[derive(Default)]
struct State {
    workers: Vec<Worker>,
    sessions: Vec<Session>,
    movements: Vec<Movement>,
    preparations: Vec<Preparation>,
    failing_workers: HashSet<String>,
    inserts: usize,
    closes: usize,
}

/// Shared in-memory event store.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store mutex poisoned")
    }

    pub fn with_worker(self, worker: Worker) -> Self {
        self.lock().workers.push(worker);
        self
    }

    pub fn with_session(self, session: Session) -> Self {
        self.lock().sessions.push(session);
        self
    }

    pub fn with_movement(self, movement: Movement) -> Self {
        self.lock().movements.push(movement);
        self
    }

    pub fn with_preparation(self, preparation: Preparation) -> Self {
        self.lock().preparations.push(preparation);
        self
    }

    /// Every read or write touching this worker fails with a database error.
    pub fn failing_for(self, worker_id: &str) -> Self {
        self.lock().failing_workers.insert(worker_id.to_string());
        self
    }

    pub fn sessions_of(&self, worker_id: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> =
            self.lock().sessions.iter().filter(|s| s.worker_id == worker_id).cloned().collect();
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn active_count(&self, worker_id: &str) -> usize {
        self.lock().sessions.iter().filter(|s| s.worker_id == worker_id && s.is_active()).count()
    }

    pub fn insert_count(&self) -> usize {
        self.lock().inserts
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    fn check(&self, worker_id: &str) -> DomainResult<()> {
        if self.lock().failing_workers.contains(worker_id) {
            return Err(FieldClockError::Database(format!("read failed for {worker_id}")));
        }
        Ok(())
    }
}

fn within(time: Option<DateTime<Utc>>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    time.is_some_and(|t| t >= start && t <= end)
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn find_sessions_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<Session>> {
        self.check(worker_id)?;
        Ok(self
            .sessions_of(worker_id)
            .into_iter()
            .filter(|s| s.start_time >= start && s.start_time <= end)
            .collect())
    }

    async fn find_active_sessions(&self) -> DomainResult<Vec<Session>> {
        Ok(self.lock().sessions.iter().filter(|s| s.is_active()).cloned().collect())
    }

    async fn find_active_session(&self, worker_id: &str) -> DomainResult<Option<Session>> {
        self.check(worker_id)?;
        Ok(self.lock().sessions.iter().find(|s| s.worker_id == worker_id && s.is_active()).cloned())
    }

    async fn insert_session(&self, session: &Session) -> DomainResult<()> {
        self.check(&session.worker_id)?;
        let mut state = self.lock();
        if session.is_active()
            && state.sessions.iter().any(|s| s.worker_id == session.worker_id && s.is_active())
        {
            return Err(FieldClockError::Conflict("active session exists".into()));
        }
        state.sessions.push(session.clone());
        state.inserts += 1;
        Ok(())
    }

    async fn close_session(&self, id: Uuid, closure: &SessionClosure) -> DomainResult<bool> {
        let worker_id = self.session(id).map(|s| s.worker_id).unwrap_or_default();
        self.check(&worker_id)?;
        let mut state = self.lock();
        let closed = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .is_some_and(|session| session.apply_closure(closure));
        if closed {
            state.closes += 1;
        }
        Ok(closed)
    }
}

#[async_trait]
impl MovementRepository for InMemoryStore {
    async fn find_movements_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<Movement>> {
        self.check(worker_id)?;
        Ok(self
            .lock()
            .movements
            .iter()
            .filter(|m| m.worker_id == worker_id)
            .filter(|m| {
                within(m.departure_time, start, end)
                    || within(m.arrival_time, start, end)
                    || within(Some(m.created_at), start, end)
                    || within(Some(m.updated_at), start, end)
            })
            .cloned()
            .collect())
    }

    async fn find_last_completed_movement(
        &self,
        worker_id: &str,
    ) -> DomainResult<Option<Movement>> {
        self.check(worker_id)?;
        Ok(self
            .lock()
            .movements
            .iter()
            .filter(|m| m.worker_id == worker_id && m.is_completed())
            .max_by_key(|m| m.completion_time())
            .cloned())
    }

    async fn has_open_movement(&self, worker_id: &str) -> DomainResult<bool> {
        self.check(worker_id)?;
        Ok(self.lock().movements.iter().any(|m| m.worker_id == worker_id && m.is_open()))
    }
}

#[async_trait]
impl PreparationRepository for InMemoryStore {
    async fn find_preparations_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<Preparation>> {
        self.check(worker_id)?;
        Ok(self
            .lock()
            .preparations
            .iter()
            .filter(|p| p.worker_id == worker_id)
            .filter(|p| {
                within(p.started_at, start, end)
                    || within(p.end_time, start, end)
                    || within(Some(p.created_at), start, end)
                    || within(Some(p.updated_at), start, end)
            })
            .cloned()
            .collect())
    }

    async fn find_last_completed_preparation(
        &self,
        worker_id: &str,
    ) -> DomainResult<Option<Preparation>> {
        self.check(worker_id)?;
        Ok(self
            .lock()
            .preparations
            .iter()
            .filter(|p| p.worker_id == worker_id && p.is_completed())
            .max_by_key(|p| p.completion_time())
            .cloned())
    }

    async fn has_open_preparation(&self, worker_id: &str) -> DomainResult<bool> {
        self.check(worker_id)?;
        Ok(self.lock().preparations.iter().any(|p| p.worker_id == worker_id && p.is_open()))
    }
}

#[async_trait]
impl WorkerDirectory for InMemoryStore {
    async fn list_workers_by_roles(&self, roles: &[WorkerRole]) -> DomainResult<Vec<Worker>> {
        Ok(self.lock().workers.iter().filter(|w| roles.contains(&w.role)).cloned().collect())
    }

    async fn find_worker(&self, worker_id: &str) -> DomainResult<Option<Worker>> {
        Ok(self.lock().workers.iter().find(|w| w.id == worker_id).cloned())
    }
}

/// Captures summaries instead of delivering them.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(RunSummary, Vec<String>)>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Recipient ids of every delivered summary.
    pub fn deliveries(&self) -> Vec<(RunSummary, Vec<String>)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send_summary(&self, summary: &RunSummary, recipients: &[Worker]) -> DomainResult<()> {
        if self.fail {
            return Err(FieldClockError::Network("smtp unreachable".into()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((summary.clone(), recipients.iter().map(|w| w.id.clone()).collect()));
        Ok(())
    }
}
