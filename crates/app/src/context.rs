//! Application context - dependency injection container

use std::sync::Arc;

use fieldclock_core::{PunchService, ReconciliationService, WorkerDirectory};
use fieldclock_domain::{Config, FieldClockError, Result, Worker};
use fieldclock_infra::scheduling::{ReconciliationScheduler, ReconciliationSchedulerConfig};
use fieldclock_infra::{
    sender_from_config, DbManager, SqliteJobRunRepository, SqliteMovementRepository,
    SqlitePreparationRepository, SqliteSessionRepository, SqliteWorkerRepository,
};
use tracing::info;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub workers: Arc<SqliteWorkerRepository>,
    pub service: Arc<ReconciliationService>,
    pub punches: PunchService,
    pub scheduler: ReconciliationScheduler,
}

impl AppContext {
    /// Open the database, apply migrations and wire every service.
    pub fn new(config: Config) -> Result<Self> {
        let timezone = config.scheduler.timezone()?;

        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;

        let sessions = Arc::new(SqliteSessionRepository::new(Arc::clone(&db)));
        let movements = Arc::new(SqliteMovementRepository::new(Arc::clone(&db)));
        let preparations = Arc::new(SqlitePreparationRepository::new(Arc::clone(&db)));
        let workers = Arc::new(SqliteWorkerRepository::new(Arc::clone(&db)));
        let notifier = sender_from_config(&config.notifications, timezone)?;

        let service = Arc::new(ReconciliationService::new(
            sessions.clone(),
            movements,
            preparations,
            workers.clone(),
            notifier,
            config.backfill.clone(),
            config.disconnect.clone(),
            timezone,
        ));
        let punches = PunchService::new(sessions, timezone);

        let scheduler_config = ReconciliationSchedulerConfig::from_settings(&config.scheduler)
            .map_err(FieldClockError::from)?;
        let runs = Arc::new(SqliteJobRunRepository::new(Arc::clone(&db)));
        let scheduler = ReconciliationScheduler::new(scheduler_config, Arc::clone(&service), runs);

        info!(
            db_path = %db.path().display(),
            timezone = timezone.name(),
            "application context initialised"
        );

        Ok(Self { config, db, workers, service, punches, scheduler })
    }

    /// Look up a worker, failing with `NotFound` when unknown.
    pub async fn worker(&self, worker_id: &str) -> Result<Worker> {
        self.workers
            .find_worker(worker_id)
            .await?
            .ok_or_else(|| FieldClockError::NotFound(format!("worker {worker_id}")))
    }
}
