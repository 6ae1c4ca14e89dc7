//! Nightly reconciliation scheduler.
//!
//! Registers the backfill and disconnect jobs on a cron scheduler evaluated
//! in the configured timezone. Two runs of the same job never overlap, even
//! across processes: every run first takes the job's lease in the
//! `job_runs` table, and inside one process a per-job run lock sits in
//! front of it. A cron tick that finds the job busy is skipped (and
//! counted); a manual trigger waits for the in-flight run.
//!
//! A run that exceeds its timeout is cancelled, not dropped: it stops after
//! the worker it is processing, so one worker's writes always land together.
//!
//! Lifecycle follows the usual scheduler rules here: join handles are
//! tracked, cancellation is explicit, and every asynchronous step is wrapped
//! in a timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldclock_core::ReconciliationService;
//! use fieldclock_infra::database::SqliteJobRunRepository;
//! use fieldclock_infra::scheduling::{
//!     ReconciliationScheduler, ReconciliationSchedulerConfig, SchedulerResult,
//! };
//!
//! # async fn example(
//! #     service: Arc<ReconciliationService>,
//! #     runs: Arc<SqliteJobRunRepository>,
//! # ) -> SchedulerResult<()> {
//! let mut scheduler =
//!     ReconciliationScheduler::new(ReconciliationSchedulerConfig::default(), service, runs);
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use fieldclock_core::ReconciliationService;
use fieldclock_domain::constants::{
    DEFAULT_BACKFILL_CRON, DEFAULT_DISCONNECT_CRON, DEFAULT_JOB_TIMEOUT_SECS,
};
use fieldclock_domain::{JobKind, Result as DomainResult, RunOutcome, RunSummary, SchedulerConfig};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::database::{JobRun, SqliteJobRunRepository};
use crate::observability::metrics::{JobMetrics, JobMetricsSnapshot};
use crate::observability::MetricsResult;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Slack added on top of the longest possible run when sizing a lease.
const LEASE_MARGIN: Duration = Duration::from_secs(30);

/// Configuration for the reconciliation scheduler.
#[derive(Debug, Clone)]
pub struct ReconciliationSchedulerConfig {
    /// Six-field cron expression (seconds first) for the backfill job.
    pub backfill_cron: String,
    /// Six-field cron expression for the disconnect sweep.
    pub disconnect_cron: String,
    /// Timezone the cron expressions are evaluated in.
    pub timezone: Tz,
    /// After this long a run is asked to stop after its current worker.
    pub job_timeout: Duration,
    /// How long a timed-out run gets to finish its current worker before it
    /// is dropped.
    pub cancel_grace: Duration,
    /// Timeout applied to delivering a run summary.
    pub notify_timeout: Duration,
    /// Interval between lease attempts while a manual trigger waits.
    pub lease_poll: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for ReconciliationSchedulerConfig {
    fn default() -> Self {
        Self {
            backfill_cron: DEFAULT_BACKFILL_CRON.into(),
            disconnect_cron: DEFAULT_DISCONNECT_CRON.into(),
            timezone: chrono_tz::Europe::Paris,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            cancel_grace: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(30),
            lease_poll: Duration::from_secs(1),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl ReconciliationSchedulerConfig {
    /// Build from the loaded application settings.
    pub fn from_settings(settings: &SchedulerConfig) -> SchedulerResult<Self> {
        let timezone = settings
            .timezone()
            .map_err(|_| SchedulerError::InvalidTimezone(settings.timezone.clone()))?;

        Ok(Self {
            backfill_cron: settings.backfill_cron.clone(),
            disconnect_cron: settings.disconnect_cron.clone(),
            timezone,
            job_timeout: settings.job_timeout(),
            ..Self::default()
        })
    }

    /// Upper bound on how long one run can hold its job: the timeout, the
    /// grace for the last worker, and a margin.
    pub fn lease_duration(&self) -> Duration {
        self.job_timeout + self.cancel_grace + LEASE_MARGIN
    }
}

/// Per-job run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    /// Per-worker errors, an interrupted run, or a run that failed outright.
    PartialFailure,
}

impl RunState {
    fn from_run(run: Option<&JobRun>, now: DateTime<Utc>) -> Self {
        let Some(run) = run else {
            return Self::Idle;
        };
        if run.is_leased(now) {
            return Self::Running;
        }
        if run.holder.is_some() {
            // Lease expired without a release: the holder died mid-run.
            return Self::PartialFailure;
        }
        match (run.last_outcome, run.last_error.as_ref()) {
            (None, None) => Self::Idle,
            (Some(RunOutcome::Completed), None) => Self::Completed,
            _ => Self::PartialFailure,
        }
    }
}

/// Status of one registered job. Run fields come from the shared store, so
/// they reflect runs made by any process on the same database.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: JobKind,
    pub cron: String,
    pub state: RunState,
    pub lease_holder: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
    /// Counters of this process only.
    #[serde(skip_serializing_if = "JobMetricsSnapshot::is_empty")]
    pub metrics: JobMetricsSnapshot,
}

/// Scheduler status as reported to administrators.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether this instance has its cron triggers registered.
    pub running: bool,
    pub timezone: String,
    pub jobs: Vec<JobStatus>,
}

/// One job's schedule, in-process run lock and counters.
struct JobSlot {
    kind: JobKind,
    cron: String,
    run_lock: Mutex<()>,
    metrics: JobMetrics,
}

impl JobSlot {
    fn new(kind: JobKind, cron: String) -> Self {
        Self { kind, cron, run_lock: Mutex::new(()), metrics: JobMetrics::new() }
    }

    fn status(&self, run: Option<JobRun>, now: DateTime<Utc>) -> JobStatus {
        let state = RunState::from_run(run.as_ref(), now);
        let run = run.unwrap_or(JobRun {
            job: self.kind,
            holder: None,
            lease_until: None,
            last_started_at: None,
            last_finished_at: None,
            last_outcome: None,
            last_error: None,
        });

        JobStatus {
            job: self.kind,
            cron: self.cron.clone(),
            state,
            lease_holder: if state == RunState::Running { run.holder } else { None },
            last_started_at: run.last_started_at,
            last_finished_at: run.last_finished_at,
            last_outcome: run.last_outcome,
            last_error: run.last_error,
            metrics: self.metrics.snapshot(),
        }
    }
}

/// How a run ended, as recorded when its lease is released.
struct RunEnd {
    outcome: Option<RunOutcome>,
    error: Option<String>,
}

/// Shared by the cron closures and the manual triggers.
struct JobRunner {
    service: Arc<ReconciliationService>,
    runs: Arc<SqliteJobRunRepository>,
    /// Identifies this scheduler instance in the lease table.
    holder: String,
    /// Cancelled on shutdown; runs stop after their current worker.
    shutdown: CancellationToken,
    job_timeout: Duration,
    cancel_grace: Duration,
    notify_timeout: Duration,
    lease_poll: Duration,
    lease_duration: Duration,
    backfill: JobSlot,
    disconnect: JobSlot,
}

impl JobRunner {
    fn slot(&self, kind: JobKind) -> &JobSlot {
        match kind {
            JobKind::Backfill => &self.backfill,
            JobKind::Disconnect => &self.disconnect,
        }
    }

    /// Cron entry point. Skips the tick when a previous run, in this or
    /// another process, still holds the job.
    async fn trigger(&self, kind: JobKind) {
        let slot = self.slot(kind);
        let Ok(guard) = slot.run_lock.try_lock() else {
            self.skip(slot, "Previous run still executing; skipping trigger");
            return;
        };

        match self.acquire_lease(kind).await {
            Ok(true) => {}
            Ok(false) => {
                self.skip(slot, "Job leased by another process; skipping trigger");
                return;
            }
            Err(err) => {
                error!(job = %kind, error = %err, "Could not take job lease; skipping trigger");
                return;
            }
        }

        if let Err(err) = self.execute(slot, guard).await {
            error!(job = %kind, error = %err, "Scheduled reconciliation run failed");
        }
    }

    /// Manual entry point. Waits for an in-flight run of the same job,
    /// wherever it runs.
    async fn run_now(&self, kind: JobKind) -> SchedulerResult<RunSummary> {
        let slot = self.slot(kind);
        let guard = slot.run_lock.lock().await;
        self.wait_for_lease(kind).await?;
        self.execute(slot, guard).await
    }

    fn skip(&self, slot: &JobSlot, message: &'static str) {
        log_metric(
            slot.metrics.record_skipped_overlap(),
            "scheduler.reconciliation.job.skipped_overlap",
        );
        warn!(job = %slot.kind, "{message}");
    }

    async fn acquire_lease(&self, kind: JobKind) -> DomainResult<bool> {
        let now = Utc::now();
        let lease = TimeDelta::from_std(self.lease_duration).unwrap_or(TimeDelta::MAX);
        let until = now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.runs.try_acquire(kind, &self.holder, now, until).await
    }

    /// Poll the lease until it is free. A holder that died frees it at the
    /// latest when its lease expires, which bounds the wait.
    async fn wait_for_lease(&self, kind: JobKind) -> SchedulerResult<()> {
        let poll = async {
            loop {
                match self.acquire_lease(kind).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => debug!(job = %kind, "Job leased elsewhere; waiting"),
                    Err(err) => return Err(SchedulerError::Lease(err)),
                }
                tokio::time::sleep(self.lease_poll).await;
            }
        };

        let wait = self.lease_duration + self.lease_poll;
        tokio::time::timeout(wait, poll)
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: wait.as_secs() })?
    }

    async fn release_lease(&self, kind: JobKind, end: RunEnd) {
        match self.runs.release(kind, &self.holder, Utc::now(), end.outcome, end.error).await {
            Ok(true) => {}
            Ok(false) => warn!(job = %kind, "Job lease expired before the run finished"),
            Err(err) => {
                warn!(job = %kind, error = %err, "Failed to release job lease; it will expire");
            }
        }
    }

    async fn run_job(
        &self,
        kind: JobKind,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> DomainResult<RunSummary> {
        match kind {
            JobKind::Backfill => {
                self.service.run_backfill(now, cancel).await.map(RunSummary::Backfill)
            }
            JobKind::Disconnect => {
                self.service.run_disconnect_sweep(now, cancel).await.map(RunSummary::Disconnect)
            }
        }
    }

    /// Run a job whose lease is held, then release the lease.
    async fn execute(
        &self,
        slot: &JobSlot,
        _guard: MutexGuard<'_, ()>,
    ) -> SchedulerResult<RunSummary> {
        log_metric(slot.metrics.record_invocation(), "scheduler.reconciliation.job.invoked");
        let now = Utc::now();
        let started = Instant::now();
        let cancel = self.shutdown.child_token();

        let run = self.run_job(slot.kind, now, &cancel);
        tokio::pin!(run);

        let (result, timed_out) = tokio::select! {
            result = &mut run => (Some(result), false),
            () = tokio::time::sleep(self.job_timeout) => {
                cancel.cancel();
                warn!(
                    job = %slot.kind,
                    timeout_secs = self.job_timeout.as_secs(),
                    "Reconciliation run timed out; stopping after the current worker"
                );
                (tokio::time::timeout(self.cancel_grace, &mut run).await.ok(), true)
            }
        };

        if timed_out {
            let seconds = self.job_timeout.as_secs();
            log_metric(slot.metrics.record_timeout(), "scheduler.reconciliation.job.timeout");
            let summary = result.and_then(Result::ok);
            let end = RunEnd {
                outcome: summary.as_ref().map(RunSummary::outcome),
                error: Some(format!("run timed out after {seconds}s")),
            };
            self.release_lease(slot.kind, end).await;
            if let Some(summary) = summary {
                self.deliver(slot.kind, &summary).await;
            }
            return Err(SchedulerError::Timeout { seconds });
        }

        let summary = match result {
            Some(Ok(summary)) => summary,
            Some(Err(err)) => {
                log_metric(
                    slot.metrics.record_failure(started.elapsed()),
                    "scheduler.reconciliation.job.error",
                );
                let end = RunEnd { outcome: None, error: Some(err.to_string()) };
                self.release_lease(slot.kind, end).await;
                return Err(SchedulerError::JobFailed(err));
            }
            None => return Err(SchedulerError::Timeout { seconds: self.job_timeout.as_secs() }),
        };

        let outcome = summary.outcome();
        let recorded = if outcome == RunOutcome::Completed {
            slot.metrics.record_success(started.elapsed())
        } else {
            slot.metrics.record_failure(started.elapsed())
        };
        log_metric(recorded, "scheduler.reconciliation.job.duration");
        self.release_lease(slot.kind, RunEnd { outcome: Some(outcome), error: None }).await;
        debug!(job = %slot.kind, ?outcome, "Reconciliation run finished");

        self.deliver(slot.kind, &summary).await;
        Ok(summary)
    }

    async fn deliver(&self, kind: JobKind, summary: &RunSummary) {
        if tokio::time::timeout(self.notify_timeout, self.service.notify(summary)).await.is_err() {
            warn!(
                job = %kind,
                timeout_secs = self.notify_timeout.as_secs(),
                "Summary delivery timed out"
            );
        }
    }

    /// Resolves once neither job holds its run lock.
    async fn wait_idle(&self) {
        let _backfill = self.backfill.run_lock.lock().await;
        let _disconnect = self.disconnect.run_lock.lock().await;
    }
}

/// Reconciliation scheduler with explicit lifecycle management.
pub struct ReconciliationScheduler {
    scheduler: Arc<RwLock<Option<JobScheduler>>>,
    config: ReconciliationSchedulerConfig,
    runner: Arc<JobRunner>,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl ReconciliationScheduler {
    pub fn new(
        config: ReconciliationSchedulerConfig,
        service: Arc<ReconciliationService>,
        runs: Arc<SqliteJobRunRepository>,
    ) -> Self {
        let runner = JobRunner {
            service,
            runs,
            holder: format!("pid-{}-{}", std::process::id(), Uuid::new_v4()),
            shutdown: CancellationToken::new(),
            job_timeout: config.job_timeout,
            cancel_grace: config.cancel_grace,
            notify_timeout: config.notify_timeout,
            lease_poll: config.lease_poll,
            lease_duration: config.lease_duration(),
            backfill: JobSlot::new(JobKind::Backfill, config.backfill_cron.clone()),
            disconnect: JobSlot::new(JobKind::Disconnect, config.disconnect_cron.clone()),
        };

        Self {
            scheduler: Arc::new(RwLock::new(None)),
            config,
            runner: Arc::new(runner),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
        }
    }
    /// Register both jobs and start the cron scheduler.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.runner.shutdown.is_cancelled() {
            return Err(SchedulerError::StartFailed("scheduler has been shut down".into()));
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        {
            let mut guard = self.scheduler.write().await;
            *guard = Some(scheduler_instance);
        }

        let cancel = self.cancellation.clone();
        self.monitor_handle = Some(tokio::spawn(Self::monitor_task(cancel)));

        info!(
            timezone = self.config.timezone.name(),
            backfill_cron = %self.config.backfill_cron,
            disconnect_cron = %self.config.disconnect_cron,
            "Reconciliation scheduler started"
        );
        Ok(())
    }

    /// Stop cron triggers and wait for in-flight runs to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let scheduler = {
            let mut guard = self.scheduler.write().await;
            guard.take()
        };
        let Some(mut scheduler) = scheduler else {
            return Err(SchedulerError::NotRunning);
        };

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StopFailed(e.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        self.drain().await?;
        info!("Reconciliation scheduler stopped");
        Ok(())
    }

    /// Interrupt in-flight runs after their current worker, then stop.
    /// The scheduler cannot be restarted afterwards.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> SchedulerResult<()> {
        self.runner.shutdown.cancel();
        if self.is_running() {
            self.stop().await
        } else {
            self.drain().await
        }
    }

    /// Run the backfill job now, waiting for a scheduled run in flight.
    pub async fn run_backfill_now(&self) -> SchedulerResult<RunSummary> {
        self.runner.run_now(JobKind::Backfill).await
    }

    /// Run the disconnect sweep now, waiting for a scheduled run in flight.
    pub async fn run_disconnect_now(&self) -> SchedulerResult<RunSummary> {
        self.runner.run_now(JobKind::Disconnect).await
    }

    /// Lease and last-run state of both jobs, read from the shared store.
    pub async fn status(&self) -> SchedulerResult<SchedulerStatus> {
        let now = Utc::now();
        let mut jobs = Vec::with_capacity(2);
        for slot in [&self.runner.backfill, &self.runner.disconnect] {
            let run = self.runner.runs.find_job_run(slot.kind).await.map_err(SchedulerError::Lease)?;
            jobs.push(slot.status(run, now));
        }

        Ok(SchedulerStatus {
            running: self.is_running(),
            timezone: self.config.timezone.name().to_string(),
            jobs,
        })
    }

    /// Returns true when the monitor task is active.
    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn drain(&self) -> SchedulerResult<()> {
        let drain_timeout = self.config.lease_duration() + self.config.notify_timeout;
        tokio::time::timeout(drain_timeout, self.runner.wait_idle())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: drain_timeout.as_secs() })
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        for kind in [JobKind::Backfill, JobKind::Disconnect] {
            let cron = self.runner.slot(kind).cron.clone();
            let runner = Arc::clone(&self.runner);

            let job = Job::new_async_tz(cron.as_str(), self.config.timezone, move |_id, _lock| {
                let runner = Arc::clone(&runner);
                Box::pin(async move {
                    runner.trigger(kind).await;
                })
            })
            .map_err(|e| SchedulerError::JobRegistrationFailed(format!("{kind} ({cron}): {e}")))?;

            let job_id = job.guid();
            scheduler
                .add(job)
                .await
                .map_err(|e| SchedulerError::JobRegistrationFailed(format!("{kind}: {e}")))?;

            debug!(job = %kind, cron = %cron, job_id = %job_id, "Registered reconciliation job");
        }

        Ok(scheduler)
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Reconciliation scheduler monitor cancelled");
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record scheduler metric");
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ReconciliationScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
            self.runner.shutdown.cancel();
        }
    }
}
