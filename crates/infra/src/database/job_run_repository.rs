//! Job run leases and last-run records backed by SQLite
//!
//! Every process that can start a nightly job (the `serve` daemon and the
//! one-shot admin commands) opens the same database, so the lease row is
//! what keeps two runs of one job apart. A lease carries an expiry so a
//! crashed holder cannot block the job forever.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fieldclock_domain::{JobKind, Result as DomainResult, RunOutcome};
use rusqlite::{params, OptionalExtension, Row, ToSql};
use serde::Serialize;
use tokio::task;

use super::columns::{from_opt_millis, parse_text, to_millis};
use super::manager::{map_join_error, map_sql_error, DbManager};

const JOB_RUN_COLUMNS: &str =
    "job, holder, lease_until, last_started_at, last_finished_at, last_outcome, last_error";

/// Persisted state of one nightly job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRun {
    pub job: JobKind,
    /// Scheduler instance currently running the job.
    pub holder: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
}

impl JobRun {
    /// True while some holder owns an unexpired lease.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.holder.is_some() && self.lease_until.is_some_and(|until| until > now)
    }
}

/// SQLite-backed job lease store.
pub struct SqliteJobRunRepository {
    db: Arc<DbManager>,
}

impl SqliteJobRunRepository {
    /// Create a new repository instance
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Take the job's lease for `holder` unless another holder owns an
    /// unexpired one. Records `now` as the run start on success.
    pub async fn try_acquire(
        &self,
        job: JobKind,
        holder: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let holder = holder.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            let now = to_millis(now);
            let lease_until = to_millis(lease_until);
            let params: [&dyn ToSql; 4] = [&job.as_str(), &holder, &lease_until, &now];

            let updated = conn
                .execute(
                    "INSERT INTO job_runs (job, holder, lease_until, last_started_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(job) DO UPDATE SET
                         holder = excluded.holder,
                         lease_until = excluded.lease_until,
                         last_started_at = excluded.last_started_at
                     WHERE job_runs.holder IS NULL
                        OR job_runs.lease_until IS NULL
                        OR job_runs.lease_until <= ?4",
                    params.as_slice(),
                )
                .map_err(map_sql_error)?;

            Ok(updated == 1)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Drop `holder`'s lease and record how the run ended. Returns false
    /// when the lease had already expired and passed to someone else.
    pub async fn release(
        &self,
        job: JobKind,
        holder: &str,
        finished_at: DateTime<Utc>,
        outcome: Option<RunOutcome>,
        error: Option<String>,
    ) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let holder = holder.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            let finished_at = to_millis(finished_at);
            let outcome = outcome.map(|outcome| outcome.as_str());
            let params: [&dyn ToSql; 5] = [&job.as_str(), &holder, &finished_at, &outcome, &error];

            let updated = conn
                .execute(
                    "UPDATE job_runs
                     SET holder = NULL, lease_until = NULL, last_finished_at = ?3,
                         last_outcome = ?4, last_error = ?5
                     WHERE job = ?1 AND holder = ?2",
                    params.as_slice(),
                )
                .map_err(map_sql_error)?;

            Ok(updated == 1)
        })
        .await
        .map_err(map_join_error)?
    }

    pub async fn find_job_run(&self, job: JobKind) -> DomainResult<Option<JobRun>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<JobRun>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("SELECT {JOB_RUN_COLUMNS} FROM job_runs WHERE job = ?1"),
                params![job.as_str()],
                map_job_run_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_job_run_row(row: &Row) -> rusqlite::Result<JobRun> {
    let job: String = row.get(0)?;
    let outcome: Option<String> = row.get(5)?;

    Ok(JobRun {
        job: parse_text(0, &job)?,
        holder: row.get(1)?,
        lease_until: from_opt_millis(2, row.get(2)?)?,
        last_started_at: from_opt_millis(3, row.get(3)?)?,
        last_finished_at: from_opt_millis(4, row.get(4)?)?,
        last_outcome: outcome.map(|raw| parse_text(5, &raw)).transpose()?,
        last_error: row.get(6)?,
    })
}
