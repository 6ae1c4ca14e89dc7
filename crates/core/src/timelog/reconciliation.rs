//! Population-wide reconciliation runs
//!
//! Each run walks its population one worker at a time. A failure for one
//! worker is recorded in the report and the run moves on; only a failure
//! to enumerate the population aborts the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fieldclock_domain::{
    BackfillPolicy, BackfillReport, DisconnectPolicy, DisconnectReport, Disconnection,
    FieldClockError, Result, RunOutcome, RunSummary, Session, SessionClosure, Worker,
    WorkerCorrections, WorkerFailure, WorkerRef, WorkerRole,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::backfill::{BackfillCorrector, DayCorrection};
use super::calendar::DayWindow;
use super::disconnect::{DisconnectDecision, DisconnectEngine};
use super::ports::{
    MovementRepository, NotificationSender, PreparationRepository, SessionRepository,
    WorkerDirectory,
};

/// Roles whose days are backfilled.
const BACKFILL_ROLES: [WorkerRole; 1] = [WorkerRole::Driver];

/// Roles that receive run summaries.
const REPORT_ROLES: [WorkerRole; 2] = [WorkerRole::Admin, WorkerRole::Direction];

/// Side-effect-free disconnect evaluation for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisconnectProbe {
    pub worker: WorkerRef,
    pub role: WorkerRole,
    pub session_id: Uuid,
    pub connected_since: DateTime<Utc>,
    pub connected_minutes: i64,
    pub decision: DisconnectDecision,
}

/// One line of the active-session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSessionStatus {
    pub session_id: Uuid,
    pub worker_id: String,
    pub worker_name: Option<String>,
    pub role: Option<WorkerRole>,
    pub start_time: DateTime<Utc>,
    pub connected_minutes: i64,
}

/// Outcome of handling one active session during a sweep.
enum SweepStep {
    Retained,
    Disconnected(Disconnection),
    AlreadyClosed,
}

/// Runs backfill and disconnect over the whole population.
pub struct ReconciliationService {
    sessions: Arc<dyn SessionRepository>,
    workers: Arc<dyn WorkerDirectory>,
    notifier: Arc<dyn NotificationSender>,
    corrector: BackfillCorrector,
    engine: DisconnectEngine,
    timezone: Tz,
}

impl ReconciliationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        movements: Arc<dyn MovementRepository>,
        preparations: Arc<dyn PreparationRepository>,
        workers: Arc<dyn WorkerDirectory>,
        notifier: Arc<dyn NotificationSender>,
        backfill: BackfillPolicy,
        disconnect: DisconnectPolicy,
        timezone: Tz,
    ) -> Self {
        let corrector = BackfillCorrector::new(
            Arc::clone(&sessions),
            Arc::clone(&movements),
            Arc::clone(&preparations),
            backfill,
        );
        let engine = DisconnectEngine::new(movements, preparations, disconnect);
        Self { sessions, workers, notifier, corrector, engine, timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Backfill the previous local day of every driver.
    ///
    /// Checks `cancel` before each worker; a cancelled run stops there and
    /// reports [`RunOutcome::Interrupted`].
    #[instrument(skip(self, cancel), fields(job = "backfill"))]
    pub async fn run_backfill(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<BackfillReport> {
        let day = DayWindow::previous_day(now, self.timezone).day;
        let workers = self.workers.list_workers_by_roles(&BACKFILL_ROLES).await?;
        info!(%day, workers = workers.len(), "Starting backfill run");

        let mut processed = 0;
        let mut skipped = 0;
        let mut corrections = Vec::new();
        let mut errors = Vec::new();
        let mut interrupted = false;

        for worker in &workers {
            if cancel.is_cancelled() {
                warn!("Backfill run cancelled; stopping before the next worker");
                interrupted = true;
                break;
            }

            let window = DayWindow::previous_day(now, worker.local_timezone(self.timezone));
            match self.corrector.correct_day(worker, &window, now).await {
                Ok(DayCorrection::Skipped) => skipped += 1,
                Ok(DayCorrection::Corrected(items)) => {
                    processed += 1;
                    if !items.is_empty() {
                        corrections.push(WorkerCorrections { worker: WorkerRef::from(worker), items });
                    }
                }
                Err(e) => {
                    warn!(worker_id = %worker.id, error = %e, "Backfill failed for worker");
                    errors.push(failure(&worker.id, Some(worker), &e));
                }
            }
        }

        let total_corrections = corrections.iter().map(|c| c.items.len()).sum();
        let report = BackfillReport {
            day,
            started_at: now,
            finished_at: Utc::now().max(now),
            workers_processed: processed,
            workers_skipped: skipped,
            corrections,
            total_corrections,
            outcome: RunOutcome::from_run(errors.len(), interrupted),
            errors,
        };

        info!(
            processed = report.workers_processed,
            skipped = report.workers_skipped,
            corrections = report.total_corrections,
            errors = report.errors.len(),
            outcome = ?report.outcome,
            "Backfill run finished"
        );

        Ok(report)
    }

    /// Evaluate every active session and close the orphaned ones.
    #[instrument(skip(self, cancel), fields(job = "disconnect"))]
    pub async fn run_disconnect_sweep(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DisconnectReport> {
        let active = self.sessions.find_active_sessions().await?;
        info!(sessions = active.len(), "Starting disconnect sweep");

        let mut processed = 0;
        let mut disconnected = 0;
        let mut retained = 0;
        let mut already_closed = 0;
        let mut disconnections = Vec::new();
        let mut errors = Vec::new();
        let mut interrupted = false;

        for session in &active {
            if cancel.is_cancelled() {
                warn!("Disconnect sweep cancelled; stopping before the next session");
                interrupted = true;
                break;
            }

            match self.sweep_session(session, now).await {
                Ok(step) => {
                    processed += 1;
                    match step {
                        SweepStep::Retained => retained += 1,
                        SweepStep::AlreadyClosed => already_closed += 1,
                        SweepStep::Disconnected(entry) => {
                            disconnected += 1;
                            disconnections.push(entry);
                        }
                    }
                }
                Err((worker, e)) => {
                    warn!(
                        worker_id = %session.worker_id,
                        session_id = %session.id,
                        error = %e,
                        "Disconnect evaluation failed"
                    );
                    errors.push(failure(&session.worker_id, worker.as_ref(), &e));
                }
            }
        }

        let report = DisconnectReport {
            started_at: now,
            finished_at: Utc::now().max(now),
            processed,
            disconnected,
            retained,
            already_closed,
            disconnections,
            outcome: RunOutcome::from_run(errors.len(), interrupted),
            errors,
        };

        info!(
            processed = report.processed,
            disconnected = report.disconnected,
            retained = report.retained,
            already_closed = report.already_closed,
            errors = report.errors.len(),
            outcome = ?report.outcome,
            "Disconnect sweep finished"
        );

        Ok(report)
    }

    async fn sweep_session(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> std::result::Result<SweepStep, (Option<Worker>, FieldClockError)> {
        let worker = match self.workers.find_worker(&session.worker_id).await {
            Ok(Some(worker)) => worker,
            Ok(None) => {
                return Err((
                    None,
                    FieldClockError::NotFound(format!(
                        "worker {} for active session {}",
                        session.worker_id, session.id
                    )),
                ))
            }
            Err(e) => return Err((None, e)),
        };

        let decision = match self.engine.evaluate(&worker, session, now).await {
            Ok(decision) => decision,
            Err(e) => return Err((Some(worker), e)),
        };

        if !decision.disconnect {
            return Ok(SweepStep::Retained);
        }

        let closure = SessionClosure::auto_disconnect(now, decision.reason.clone());
        match self.sessions.close_session(session.id, &closure).await {
            Ok(true) => {
                info!(
                    worker_id = %worker.id,
                    session_id = %session.id,
                    reason = %decision.reason,
                    "Session auto-disconnected"
                );
                Ok(SweepStep::Disconnected(Disconnection {
                    worker: WorkerRef::from(&worker),
                    role: worker.role,
                    session_id: session.id,
                    reason: decision.reason,
                }))
            }
            Ok(false) => {
                info!(session_id = %session.id, "Session already closed by another path");
                Ok(SweepStep::AlreadyClosed)
            }
            Err(e) => Err((Some(worker), e)),
        }
    }

    /// Deliver a summary to every admin and direction worker with an email.
    /// Never fails: delivery problems are logged.
    #[instrument(skip(self, summary), fields(job = %summary.job()))]
    pub async fn notify(&self, summary: &RunSummary) {
        let recipients = match self.workers.list_workers_by_roles(&REPORT_ROLES).await {
            Ok(workers) => workers
                .into_iter()
                .filter(|w| w.email.as_deref().is_some_and(|email| !email.trim().is_empty()))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(error = %e, "Could not load summary recipients");
                return;
            }
        };

        if recipients.is_empty() {
            info!("No summary recipients configured, skipping notification");
            return;
        }

        match self.notifier.send_summary(summary, &recipients).await {
            Ok(()) => info!(recipients = recipients.len(), "Run summary sent"),
            Err(e) => warn!(error = %e, "Failed to send run summary"),
        }
    }

    /// Evaluate a worker's active session without closing it.
    pub async fn probe_worker(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DisconnectProbe>> {
        let worker = self
            .workers
            .find_worker(worker_id)
            .await?
            .ok_or_else(|| FieldClockError::NotFound(format!("worker {worker_id}")))?;

        let Some(session) = self.sessions.find_active_session(worker_id).await? else {
            return Ok(None);
        };

        let decision = self.engine.evaluate(&worker, &session, now).await?;
        Ok(Some(DisconnectProbe {
            worker: WorkerRef::from(&worker),
            role: worker.role,
            session_id: session.id,
            connected_since: session.start_time,
            connected_minutes: session.connected_minutes(now),
            decision,
        }))
    }

    /// Every active session with its worker, longest connected first.
    pub async fn active_status(&self, now: DateTime<Utc>) -> Result<Vec<ActiveSessionStatus>> {
        let active = self.sessions.find_active_sessions().await?;
        let mut rows = Vec::with_capacity(active.len());

        for session in active {
            let worker = self.workers.find_worker(&session.worker_id).await?;
            rows.push(ActiveSessionStatus {
                session_id: session.id,
                worker_name: worker.as_ref().map(|w| w.full_name.clone()),
                role: worker.as_ref().map(|w| w.role),
                connected_minutes: session.connected_minutes(now),
                start_time: session.start_time,
                worker_id: session.worker_id,
            });
        }

        rows.sort_by_key(|row| row.start_time);
        Ok(rows)
    }
}

fn failure(worker_id: &str, worker: Option<&Worker>, error: &FieldClockError) -> WorkerFailure {
    WorkerFailure {
        worker_id: worker_id.to_string(),
        worker_name: worker.map(|w| w.full_name.clone()),
        message: error.to_string(),
    }
}
