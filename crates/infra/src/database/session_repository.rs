//! Session repository implementation using SQLite
//!
//! Sessions are append-only: the only update is the conditional close of an
//! active row. The single-active-session rule is enforced by a partial
//! unique index, so concurrent inserts surface as `Conflict`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldclock_core::SessionRepository as SessionRepositoryPort;
use fieldclock_domain::{Result as DomainResult, Session, SessionClosure};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tokio::task;
use uuid::Uuid;

use super::columns::{
    from_json, from_millis, from_opt_millis, opt_millis, parse_text, to_json, to_millis,
};
use super::manager::{map_join_error, map_sql_error, DbManager};

const SESSION_COLUMNS: &str = "id, worker_id, start_time, end_time, status, session_type,
     is_auto_generated, auto_generation_reason, is_auto_disconnected, auto_disconnect_reason,
     notes, start_location, end_location, audit_trail, created_at";

/// SQLite-backed implementation of `SessionRepository`
pub struct SqliteSessionRepository {
    db: Arc<DbManager>,
}

impl SqliteSessionRepository {
    /// Create a new repository instance
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Look up a single session by id.
    pub async fn find_session(&self, id: Uuid) -> DomainResult<Option<Session>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<Session>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id.to_string()],
                map_session_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl SessionRepositoryPort for SqliteSessionRepository {
    async fn find_sessions_in_range(
        &self,
        worker_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<Session>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<Session>> {
            let conn = db.get_connection()?;
            query_sessions(
                &conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE worker_id = ?1 AND start_time >= ?2 AND start_time <= ?3
                     ORDER BY start_time ASC"
                ),
                &[&worker_id, &to_millis(start), &to_millis(end)],
            )
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_active_sessions(&self) -> DomainResult<Vec<Session>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<Session>> {
            let conn = db.get_connection()?;
            query_sessions(
                &conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE status = 'active'
                     ORDER BY start_time ASC"
                ),
                &[],
            )
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_active_session(&self, worker_id: &str) -> DomainResult<Option<Session>> {
        let db = Arc::clone(&self.db);
        let worker_id = worker_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Session>> {
            let conn = db.get_connection()?;
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE worker_id = ?1 AND status = 'active'"
                ),
                params![worker_id],
                map_session_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn insert_session(&self, session: &Session) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let session = session.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            insert_session(&conn, &session).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn close_session(&self, id: Uuid, closure: &SessionClosure) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let closure = closure.clone();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            close_session(&conn, id, &closure).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn map_session_row(row: &Row) -> rusqlite::Result<Session> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    let session_type: String = row.get(5)?;
    let auto_generation_reason: Option<String> = row.get(7)?;
    let start_location: Option<String> = row.get(11)?;
    let end_location: Option<String> = row.get(12)?;
    let audit_trail: String = row.get(13)?;

    Ok(Session {
        id: parse_text(0, &id)?,
        worker_id: row.get(1)?,
        start_time: from_millis(2, row.get(2)?)?,
        end_time: from_opt_millis(3, row.get(3)?)?,
        status: parse_text(4, &status)?,
        session_type: parse_text(5, &session_type)?,
        is_auto_generated: row.get(6)?,
        auto_generation_reason: auto_generation_reason
            .as_deref()
            .map(|raw| parse_text(7, raw))
            .transpose()?,
        is_auto_disconnected: row.get(8)?,
        auto_disconnect_reason: row.get(9)?,
        notes: row.get(10)?,
        start_location: start_location.as_deref().map(|raw| from_json(11, raw)).transpose()?,
        end_location: end_location.as_deref().map(|raw| from_json(12, raw)).transpose()?,
        audit_trail: from_json(13, &audit_trail)?,
        created_at: from_millis(14, row.get(14)?)?,
    })
}

fn query_sessions(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> DomainResult<Vec<Session>> {
    let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
    let rows = stmt.query_map(params, map_session_row).map_err(map_sql_error)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
}

fn insert_session(conn: &Connection, session: &Session) -> rusqlite::Result<()> {
    let id = session.id.to_string();
    let start_time = to_millis(session.start_time);
    let end_time = opt_millis(session.end_time);
    let reason = session.auto_generation_reason.map(|r| r.as_str());
    let start_location = session.start_location.as_ref().map(to_json).transpose()?;
    let end_location = session.end_location.as_ref().map(to_json).transpose()?;
    let audit_trail = to_json(&session.audit_trail)?;
    let created_at = to_millis(session.created_at);

    let params: [&dyn ToSql; 15] = [
        &id,
        &session.worker_id,
        &start_time,
        &end_time,
        &session.status.as_str(),
        &session.session_type.as_str(),
        &session.is_auto_generated,
        &reason,
        &session.is_auto_disconnected,
        &session.auto_disconnect_reason,
        &session.notes,
        &start_location,
        &end_location,
        &audit_trail,
        &created_at,
    ];

    conn.execute(
        &format!(
            "INSERT INTO sessions ({SESSION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params.as_slice(),
    )?;

    Ok(())
}

/// Close the session only while it is still active. The audit entry is
/// appended in the same statement so a lost race leaves no trace.
fn close_session(conn: &Connection, id: Uuid, closure: &SessionClosure) -> rusqlite::Result<bool> {
    let id = id.to_string();
    let end_time = to_millis(closure.end_time);
    let end_location = closure.end_location.as_ref().map(to_json).transpose()?;
    let reason = closure.auto_disconnect.as_ref().map(|auto| auto.reason.clone());
    let entry = closure.auto_disconnect.as_ref().map(|auto| to_json(&auto.entry)).transpose()?;

    let params: [&dyn ToSql; 6] =
        [&end_time, &closure.notes, &end_location, &reason, &entry, &id];

    let updated = conn.execute(
        "UPDATE sessions
         SET end_time = ?1,
             status = 'completed',
             notes = COALESCE(?2, notes),
             end_location = COALESCE(?3, end_location),
             is_auto_disconnected = CASE WHEN ?4 IS NULL THEN is_auto_disconnected ELSE 1 END,
             auto_disconnect_reason = COALESCE(?4, auto_disconnect_reason),
             audit_trail = CASE WHEN ?5 IS NULL THEN audit_trail
                                ELSE json_insert(audit_trail, '$[#]', json(?5)) END
         WHERE id = ?6 AND status = 'active'",
        params.as_slice(),
    )?;

    Ok(updated == 1)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fieldclock_domain::{
        AuditKind, AutoGenerationReason, FieldClockError, Location, SessionStatus, SessionType,
    };
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

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_find_active_session() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteSessionRepository::new(db);

        let mut session = Session::open("d1", SessionType::StartService, at(7, 0));
        session.start_location =
            Some(Location { latitude: 50.85, longitude: 4.35, label: Some("Depot".into()) });
        repo.insert_session(&session).await.expect("insert session");

        let active = repo.find_active_session("d1").await.expect("find active").expect("present");
        assert_eq!(active, session);
        assert_eq!(repo.find_active_sessions().await.expect("all active").len(), 1);
        assert!(repo.find_active_session("d2").await.expect("find active").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_active_session_conflicts() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteSessionRepository::new(db);

        repo.insert_session(&Session::open("d1", SessionType::StartService, at(7, 0)))
            .await
            .expect("first insert");
        let err = repo
            .insert_session(&Session::open("d1", SessionType::General, at(8, 0)))
            .await
            .expect_err("second active session");
        assert!(matches!(err, FieldClockError::Conflict(_)));

        let completed = Session::synthesized(
            "d1",
            SessionType::StartBreak,
            at(12, 0),
            at(12, 0),
            AutoGenerationReason::MissingBreak,
            "Inactivity of 90 minutes detected",
            at(23, 0),
        );
        repo.insert_session(&completed).await.expect("completed rows never conflict");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sessions_in_range_are_ordered() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteSessionRepository::new(db);

        for (hour, ty) in [(16, SessionType::EndService), (7, SessionType::StartService)] {
            let mut session = Session::open("d1", ty, at(hour, 0));
            session.apply_closure(&SessionClosure::manual(at(hour, 1)));
            repo.insert_session(&session).await.expect("insert");
        }

        let sessions =
            repo.find_sessions_in_range("d1", at(0, 0), at(23, 59)).await.expect("range");
        let types: Vec<_> = sessions.iter().map(|s| s.session_type).collect();
        assert_eq!(types, vec![SessionType::StartService, SessionType::EndService]);

        let morning = repo.find_sessions_in_range("d1", at(0, 0), at(8, 0)).await.expect("range");
        assert_eq!(morning.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_auto_disconnect_close_keeps_human_notes() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteSessionRepository::new(db);

        let mut session = Session::open("d1", SessionType::StartService, at(7, 0));
        session.notes = Some("flat tyre".into());
        repo.insert_session(&session).await.expect("insert");

        let closure = SessionClosure::auto_disconnect(at(23, 0), "No movement and connected for 16h");
        assert!(repo.close_session(session.id, &closure).await.expect("close"));

        let closed = repo.find_session(session.id).await.expect("find").expect("present");
        assert_eq!(closed.status, SessionStatus::Completed);
        assert_eq!(closed.end_time, Some(at(23, 0)));
        assert!(closed.is_auto_disconnected);
        assert_eq!(
            closed.auto_disconnect_reason.as_deref(),
            Some("No movement and connected for 16h")
        );
        assert_eq!(closed.notes.as_deref(), Some("flat tyre"));
        assert_eq!(closed.audit_trail.len(), 1);
        assert_eq!(closed.audit_trail[0].kind, AuditKind::AutoDisconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closing_twice_is_a_no_op() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteSessionRepository::new(db);

        let session = Session::open("d1", SessionType::StartService, at(7, 0));
        repo.insert_session(&session).await.expect("insert");

        assert!(repo
            .close_session(session.id, &SessionClosure::auto_disconnect(at(20, 0), "first"))
            .await
            .expect("first close"));
        assert!(!repo
            .close_session(session.id, &SessionClosure::auto_disconnect(at(21, 0), "second"))
            .await
            .expect("second close"));

        let closed = repo.find_session(session.id).await.expect("find").expect("present");
        assert_eq!(closed.end_time, Some(at(20, 0)));
        assert_eq!(closed.auto_disconnect_reason.as_deref(), Some("first"));
        assert_eq!(closed.audit_trail.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_manual_close_sets_location_and_notes() {
        let (db, _temp_dir) = setup_test_db();
        let repo = SqliteSessionRepository::new(db);

        let session = Session::open("d1", SessionType::General, at(9, 0));
        repo.insert_session(&session).await.expect("insert");

        let depot = Location { latitude: 1.0, longitude: 2.0, label: None };
        let closure = SessionClosure {
            end_time: at(10, 0),
            notes: Some("keys returned".into()),
            end_location: Some(depot.clone()),
            auto_disconnect: None,
        };
        assert!(repo.close_session(session.id, &closure).await.expect("close"));

        let closed = repo.find_session(session.id).await.expect("find").expect("present");
        assert!(!closed.is_auto_disconnected);
        assert_eq!(closed.end_location, Some(depot));
        assert_eq!(closed.notes.as_deref(), Some("keys returned"));
        assert!(closed.audit_trail.is_empty());
    }
}
