//! Movement repository implementation using SQLite
//!
//! Movements are owned by the dispatch side; the engine only reads them.
//! `upsert_movement` exists for imports and tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldclock_core::MovementRepository as MovementRepositoryPort;
use fieldclock_domain::{Movement, Result as DomainResult};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::task;

use super::columns::{from_millis, from_opt_millis, opt_millis, parse_text, to_millis};
use super::manager::{map_join_error, map_sql_error, DbManager};

const MOVEMENT_COLUMNS: &str =
    "id, worker_id, status, departure_time, arrival_time, created_at, updated_at";

/// SQLite-backed implementation of `MovementRepository`
pub struct SqliteMovementRepository {
    db: Arc<DbManager>,
}

impl SqliteMovementRepository {
    /// Create a new repository instance
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace a movement by id.
    pub async fn upsert_movement(&self, movement: &Movement) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let movement = movement.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            upsert_movement(&conn, &movement).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl MovementRepositoryPort for SqliteMovementRepository {
    async fn find_movements_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<Movement>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<Movement>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MOVEMENT_COLUMNS} FROM movements
                     WHERE worker_id = ?1
                       AND ((departure_time BETWEEN ?2 AND ?3)
                         OR (arrival_time BETWEEN ?2 AND ?3)
                         OR (created_at BETWEEN ?2 AND ?3)
                         OR (updated_at BETWEEN ?2 AND ?3))
                     ORDER BY COALESCE(departure_time, created_at) ASC"
                ))
                .map_err(map_sql_error)?;

            let params: [&dyn ToSql; 3] = [&worker_id, &to_millis(start), &to_millis(end)];
            let rows = stmt.query_map(params.as_slice(), map_movement_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_last_completed_movement(&self, worker_id: &str) -> DomainResult<Option<Movement>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Movement>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!(
                    "SELECT {MOVEMENT_COLUMNS} FROM movements
                     WHERE worker_id = ?1 AND status = 'completed'
                     ORDER BY COALESCE(arrival_time, updated_at) DESC
                     LIMIT 1"
                ),
                params![worker_id],
                map_movement_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn has_open_movement(&self, worker_id: &str) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM movements
                    WHERE worker_id = ?1
                      AND status IN ('preparing', 'in_progress', 'in-progress'))",
                params![worker_id],
                |row| row.get::<_, bool>(0),
            )
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn map_movement_row(row: &Row) -> rusqlite::Result<Movement> {
    let status: String = row.get(2)?;

    Ok(Movement {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        status: parse_text(2, &status)?,
        departure_time: from_opt_millis(3, row.get(3)?)?,
        arrival_time: from_opt_millis(4, row.get(4)?)?,
        created_at: from_millis(5, row.get(5)?)?,
        updated_at: from_millis(6, row.get(6)?)?,
    })
}

fn upsert_movement(conn: &Connection, movement: &Movement) -> rusqlite::Result<()> {
    let departure_time = opt_millis(movement.departure_time);
    let arrival_time = opt_millis(movement.arrival_time);
    let created_at = to_millis(movement.created_at);
    let updated_at = to_millis(movement.updated_at);

    let params: [&dyn ToSql; 7] = [
        &movement.id,
        &movement.worker_id,
        &movement.status.as_str(),
        &departure_time,
        &arrival_time,
        &created_at,
        &updated_at,
    ];

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO movements ({MOVEMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params.as_slice(),
    )?;

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fieldclock_domain::MovementStatus;
    use tempfile::TempDir;

    use super::*;

    fn setup_test_db() -> (Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("create temp dir");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 4).expect("create db manager");
        manager.run_migrations().expect("run migrations");
        (Arc::new(manager), temp_dir)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).single().expect("valid timestamp")
    }

    fn movement(id: &str, status: MovementStatus, depart: u32, arrive: Option<u32>) -> Movement {
        Movement {
            id: id.into(),
            worker_id: "d1".into(),
            status,
            departure_time: Some(at(4, depart)),
            arrival_time: arrive.map(|hour| at(4, hour)),
            created_at: at(3, 18),
            updated_at: at(4, arrive.unwrap_or(depart)),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_range_matches_any_timestamp() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteMovementRepository::new(db);

        repo.upsert_movement(&movement("m1", MovementStatus::Completed, 8, Some(10)))
            .await
            .expect("upsert");
        let found = repo.find_movements_in_range("d1", at(4, 0), at(4, 23)).await.expect("range");
        assert_eq!(found.len(), 1);

        // Only created_at (18:00 on the 3rd) falls in this window.
        let found = repo.find_movements_in_range("d1", at(3, 17), at(3, 19)).await.expect("range");
        assert_eq!(found.len(), 1);

        let found = repo.find_movements_in_range("d1", at(5, 0), at(5, 23)).await.expect("range");
        assert!(found.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_completed_uses_arrival_time() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteMovementRepository::new(db);

        repo.upsert_movement(&movement("early", MovementStatus::Completed, 8, Some(9)))
            .await
            .expect("upsert");
        repo.upsert_movement(&movement("late", MovementStatus::Completed, 13, Some(15)))
            .await
            .expect("upsert");
        repo.upsert_movement(&movement("cancel", MovementStatus::Cancelled, 16, Some(17)))
            .await
            .expect("upsert");

        let last = repo.find_last_completed_movement("d1").await.expect("query").expect("present");
        assert_eq!(last.id, "late");
        assert!(repo.find_last_completed_movement("d2").await.expect("query").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_has_open_movement_accepts_legacy_status() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteMovementRepository::new(Arc::clone(&db));

        assert!(!repo.has_open_movement("d1").await.expect("query"));

        let conn = db.get_connection().expect("connection");
        conn.execute(
            "INSERT INTO movements (id, worker_id, status, created_at, updated_at)
             VALUES ('legacy', 'd1', 'in-progress', 0, 0)",
            [],
        )
        .expect("raw insert");

        assert!(repo.has_open_movement("d1").await.expect("query"));
        let epoch = DateTime::from_timestamp_millis(0).expect("epoch");
        let found = repo.find_movements_in_range("d1", epoch, at(4, 0)).await.expect("range");
        assert_eq!(found[0].status, MovementStatus::InProgress);
    }
}
