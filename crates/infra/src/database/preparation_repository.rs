//! Preparation repository implementation using SQLite

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldclock_core::PreparationRepository as PreparationRepositoryPort;
use fieldclock_domain::{Preparation, Result as DomainResult};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::task;

use super::columns::{from_millis, from_opt_millis, opt_millis, parse_text, to_millis};
use super::manager::{map_join_error, map_sql_error, DbManager};

const PREPARATION_COLUMNS: &str =
    "id, worker_id, status, started_at, end_time, created_at, updated_at";

/// SQLite-backed implementation of `PreparationRepository`
pub struct SqlitePreparationRepository {
    db: Arc<DbManager>,
}

impl SqlitePreparationRepository {
    /// Create a new repository instance
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace a preparation by id.
    pub async fn upsert_preparation(&self, preparation: &Preparation) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let preparation = preparation.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            upsert_preparation(&conn, &preparation).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl PreparationRepositoryPort for SqlitePreparationRepository {
    async fn find_preparations_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<Preparation>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<Preparation>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {PREPARATION_COLUMNS} FROM preparations
                     WHERE worker_id = ?1
                       AND ((started_at BETWEEN ?2 AND ?3)
                         OR (end_time BETWEEN ?2 AND ?3)
                         OR (created_at BETWEEN ?2 AND ?3)
                         OR (updated_at BETWEEN ?2 AND ?3))
                     ORDER BY COALESCE(started_at, created_at) ASC"
                ))
                .map_err(map_sql_error)?;

            let params: [&dyn ToSql; 3] = [&worker_id, &to_millis(start), &to_millis(end)];
            let rows =
                stmt.query_map(params.as_slice(), map_preparation_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_last_completed_preparation(
        &self,
        worker_id: &str,
    ) -> DomainResult<Option<Preparation>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Preparation>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!(
                    "SELECT {PREPARATION_COLUMNS} FROM preparations
                     WHERE worker_id = ?1 AND status = 'completed'
                     ORDER BY COALESCE(end_time, updated_at) DESC
                     LIMIT 1"
                ),
                params![worker_id],
                map_preparation_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn has_open_preparation(&self, worker_id: &str) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM preparations
                    WHERE worker_id = ?1 AND status IN ('in_progress', 'in-progress'))",
                params![worker_id],
                |row| row.get::<_, bool>(0),
            )
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_preparation_row(row: &Row) -> rusqlite::Result<Preparation> {
    let status: String = row.get(2)?;

    Ok(Preparation {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        status: parse_text(2, &status)?,
        started_at: from_opt_millis(3, row.get(3)?)?,
        end_time: from_opt_millis(4, row.get(4)?)?,
        created_at: from_millis(5, row.get(5)?)?,
        updated_at: from_millis(6, row.get(6)?)?,
    })
}

fn upsert_preparation(conn: &Connection, preparation: &Preparation) -> rusqlite::Result<()> {
    let started_at = opt_millis(preparation.started_at);
    let end_time = opt_millis(preparation.end_time);
    let created_at = to_millis(preparation.created_at);
    let updated_at = to_millis(preparation.updated_at);

    let params: [&dyn ToSql; 7] = [
        &preparation.id,
        &preparation.worker_id,
        &preparation.status.as_str(),
        &started_at,
        &end_time,
        &created_at,
        &updated_at,
    ];

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO preparations ({PREPARATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params.as_slice(),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fieldclock_domain::PreparationStatus;
    use tempfile::TempDir;

    use super::*;

    fn setup_test_db() -> (Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("create temp dir");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 4).expect("create db manager");
        manager.run_migrations().expect("run migrations");
        (Arc::new(manager), temp_dir)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, hour, minute, 0).single().expect("valid timestamp")
    }

    fn preparation(id: &str, status: PreparationStatus, end: Option<DateTime<Utc>>) -> Preparation {
        Preparation {
            id: id.into(),
            worker_id: "p1".into(),
            status,
            started_at: Some(at(8, 0)),
            end_time: end,
            created_at: at(7, 0),
            updated_at: at(18, 0),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_completed_falls_back_to_updated_at() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqlitePreparationRepository::new(db);

        repo.upsert_preparation(&preparation("timed", PreparationStatus::Completed, Some(at(9, 0))))
            .await
            .expect("upsert");
        // No end time: completion falls back to updated_at (18:00).
        repo.upsert_preparation(&preparation("untimed", PreparationStatus::Completed, None))
            .await
            .expect("upsert");

        let last =
            repo.find_last_completed_preparation("p1").await.expect("query").expect("present");
        assert_eq!(last.id, "untimed");
        assert_eq!(last.completion_time(), at(18, 0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_preparation_and_range() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqlitePreparationRepository::new(db);

        assert!(!repo.has_open_preparation("p1").await.expect("query"));
        repo.upsert_preparation(&preparation("live", PreparationStatus::InProgress, None))
            .await
            .expect("upsert");
        assert!(repo.has_open_preparation("p1").await.expect("query"));

        let found =
            repo.find_preparations_in_range("p1", at(7, 30), at(8, 30)).await.expect("range");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, PreparationStatus::InProgress);

        // Upsert replaces by id.
        repo.upsert_preparation(&preparation("live", PreparationStatus::Completed, Some(at(10, 0))))
            .await
            .expect("upsert");
        assert!(!repo.has_open_preparation("p1").await.expect("query"));
    }
}
