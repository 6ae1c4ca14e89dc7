//! Worker directory backed by SQLite

use std::sync::Arc;

use async_trait::async_trait;
use fieldclock_core::WorkerDirectory;
use fieldclock_domain::{Result as DomainResult, Worker, WorkerRole};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

const WORKER_COLUMNS: &str = "id, username, full_name, role, email, timezone";

/// SQLite-backed implementation of `WorkerDirectory`
pub struct SqliteWorkerRepository {
    db: Arc<DbManager>,
}

impl SqliteWorkerRepository {
    /// Create a new repository instance
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace a worker by id.
    pub async fn upsert_worker(&self, worker: &Worker) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let worker = worker.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            upsert_worker(&conn, &worker).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Every known worker, ordered by id.
    pub async fn list_workers(&self) -> DomainResult<Vec<Worker>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<Worker>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY id"))
                .map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_worker_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl WorkerDirectory for SqliteWorkerRepository {
    /// Roles are stored as free text with legacy spellings, so filtering
    /// happens after the lenient parse rather than in SQL.
    async fn list_workers_by_roles(&self, roles: &[WorkerRole]) -> DomainResult<Vec<Worker>> {
        let roles = roles.to_vec();
        let workers = self.list_workers().await?;
        Ok(workers.into_iter().filter(|worker| roles.contains(&worker.role)).collect())
    }

    async fn find_worker(&self, worker_id: &str) -> DomainResult<Option<Worker>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Worker>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?1"),
                params![worker_id],
                map_worker_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_worker_row(row: &Row) -> rusqlite::Result<Worker> {
    let role: String = row.get(3)?;

    Ok(Worker {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        role: WorkerRole::parse(&role),
        email: row.get(4)?,
        timezone: row.get(5)?,
    })
}

fn upsert_worker(conn: &Connection, worker: &Worker) -> rusqlite::Result<()> {
    let params: [&dyn ToSql; 6] = [
        &worker.id,
        &worker.username,
        &worker.full_name,
        &worker.role.as_str(),
        &worker.email,
        &worker.timezone,
    ];

    conn.execute(
        &format!("INSERT OR REPLACE INTO workers ({WORKER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params.as_slice(),
    )?;

    Ok(())
}
