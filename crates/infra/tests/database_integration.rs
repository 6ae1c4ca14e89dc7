//! End-to-end reconciliation runs against the SQLite event store.
//!
//! Each test operates on an isolated database with migrations applied and
//! drives the core `ReconciliationService` through the real repositories.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use fieldclock_core::{ReconciliationService, SessionRepository};
use fieldclock_domain::{
    AuditKind, BackfillPolicy, DisconnectPolicy, Movement, MovementStatus, Preparation,
    PreparationStatus, RunOutcome, Session, SessionClosure, SessionType, Worker, WorkerRole,
};
use fieldclock_infra::database::{
    DbManager, SqliteMovementRepository, SqlitePreparationRepository, SqliteSessionRepository,
    SqliteWorkerRepository,
};
use fieldclock_infra::LogNotificationSender;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct DbHarness {
    #[allow(dead_code)]
    temp_dir: TempDir,
    manager: Arc<DbManager>,
    sessions: Arc<SqliteSessionRepository>,
    movements: Arc<SqliteMovementRepository>,
    preparations: Arc<SqlitePreparationRepository>,
    workers: Arc<SqliteWorkerRepository>,
}

impl DbHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("temporary directory should be created");
        let db_path = temp_dir.path().join("infra-integration.db");

        let manager =
            Arc::new(DbManager::new(&db_path, 4).expect("database manager should initialise"));
        manager.run_migrations().expect("schema migrations should apply");

        Self {
            sessions: Arc::new(SqliteSessionRepository::new(Arc::clone(&manager))),
            movements: Arc::new(SqliteMovementRepository::new(Arc::clone(&manager))),
            preparations: Arc::new(SqlitePreparationRepository::new(Arc::clone(&manager))),
            workers: Arc::new(SqliteWorkerRepository::new(Arc::clone(&manager))),
            temp_dir,
            manager,
        }
    }

    fn service(&self) -> ReconciliationService {
        ReconciliationService::new(
            self.sessions.clone(),
            self.movements.clone(),
            self.preparations.clone(),
            self.workers.clone(),
            Arc::new(LogNotificationSender::new(Tz::UTC)),
            BackfillPolicy::default(),
            DisconnectPolicy::default(),
            Tz::UTC,
        )
    }

    async fn worker(&self, id: &str, role: WorkerRole) {
        let worker = Worker::new(id, id, format!("Worker {id}"), role).with_timezone("UTC");
        self.workers.upsert_worker(&worker).await.expect("worker should be stored");
    }

    async fn completed_punch(&self, worker_id: &str, session_type: SessionType, time: DateTime<Utc>) {
        let mut session = Session::open(worker_id, session_type, time);
        session.apply_closure(&SessionClosure::manual(time));
        self.sessions.insert_session(&session).await.expect("punch should be stored");
    }

    async fn movement(&self, id: &str, worker_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) {
        let movement = Movement {
            id: id.into(),
            worker_id: worker_id.into(),
            status: MovementStatus::Completed,
            departure_time: Some(from),
            arrival_time: Some(to),
            created_at: from,
            updated_at: to,
        };
        self.movements.upsert_movement(&movement).await.expect("movement should be stored");
    }

    /// Service start at 07:30, movements 08:00-12:00 and 13:30-16:00.
    async fn incomplete_driver_day(&self, worker_id: &str) {
        self.worker(worker_id, WorkerRole::Driver).await;
        self.completed_punch(worker_id, SessionType::StartService, at(7, 30)).await;
        self.movement(&format!("{worker_id}-m1"), worker_id, at(8, 0), at(12, 0)).await;
        self.movement(&format!("{worker_id}-m2"), worker_id, at(13, 30), at(16, 0)).await;
    }

    async fn day_of(&self, worker_id: &str) -> Vec<Session> {
        self.sessions
            .find_sessions_in_range(worker_id, at(0, 0), at(23, 59))
            .await
            .expect("sessions should load")
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, hour, minute, 0).single().expect("valid timestamp")
}

fn nightly() -> DateTime<Utc> {
    at(3, 0) + TimeDelta::days(1)
}

#[tokio::test(flavor = "multi_thread")]
async fn backfill_writes_missing_punches_once() {
    let harness = DbHarness::new();
    harness.incomplete_driver_day("d1").await;
    let service = harness.service();

    let report =
        service.run_backfill(nightly(), &CancellationToken::new()).await.expect("backfill run");
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.total_corrections, 3);

    let day = harness.day_of("d1").await;
    let types: Vec<_> = day.iter().map(|s| s.session_type).collect();
    assert_eq!(
        types,
        vec![
            SessionType::StartService,
            SessionType::StartBreak,
            SessionType::EndBreak,
            SessionType::EndService
        ]
    );
    assert_eq!(day[1].start_time, at(12, 0));
    assert_eq!(day[2].start_time, at(13, 0));
    assert_eq!(day[3].start_time, at(16, 0));
    assert!(day[1..].iter().all(|s| s.is_auto_generated && s.audit_trail.len() == 1));
    assert_eq!(day[1].audit_trail[0].kind, AuditKind::AutoGenerated);

    let second =
        service.run_backfill(nightly(), &CancellationToken::new()).await.expect("second run");
    assert_eq!(second.total_corrections, 0);
    assert_eq!(harness.day_of("d1").await, day);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_row_fails_only_its_worker() {
    let harness = DbHarness::new();
    for id in ["a", "b", "c"] {
        harness.incomplete_driver_day(id).await;
    }

    let conn = harness.manager.get_connection().expect("connection");
    conn.execute(
        "INSERT INTO sessions (id, worker_id, start_time, status, session_type, created_at)
         VALUES ('broken', 'b', ?1, 'completed', 'lunch', ?1)",
        [at(9, 0).timestamp_millis()],
    )
    .expect("raw insert");
    drop(conn);

    let report = harness
        .service()
        .run_backfill(nightly(), &CancellationToken::new())
        .await
        .expect("backfill run");

    assert_eq!(report.outcome, RunOutcome::PartialFailure);
    assert_eq!(report.workers_processed, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].worker_id, "b");
    let corrected: Vec<_> = report.corrections.iter().map(|c| c.worker.id.as_str()).collect();
    assert_eq!(corrected, vec!["a", "c"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_sweep_applies_role_rules() {
    let harness = DbHarness::new();
    let now = at(20, 0);

    harness.worker("d1", WorkerRole::Driver).await;
    harness.worker("p1", WorkerRole::Preparator).await;
    harness.worker("a1", WorkerRole::Admin).await;

    let driver_session = Session::open("d1", SessionType::StartService, at(7, 0));
    let preparator_session = Session::open("p1", SessionType::StartService, at(18, 0));
    let admin_session = Session::open("a1", SessionType::General, at(7, 0));
    for session in [&driver_session, &preparator_session, &admin_session] {
        harness.sessions.insert_session(session).await.expect("open session");
    }

    harness.movement("m1", "d1", at(19, 0), now - TimeDelta::minutes(16)).await;
    harness
        .preparations
        .upsert_preparation(&Preparation {
            id: "prep".into(),
            worker_id: "p1".into(),
            status: PreparationStatus::InProgress,
            started_at: Some(at(19, 30)),
            end_time: None,
            created_at: at(19, 30),
            updated_at: at(19, 30),
        })
        .await
        .expect("preparation stored");

    let report = harness
        .service()
        .run_disconnect_sweep(now, &CancellationToken::new())
        .await
        .expect("disconnect sweep");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.processed, 3);
    assert_eq!(report.disconnected, 2);
    assert_eq!(report.retained, 1);

    let driver = harness.sessions.find_session(driver_session.id).await.expect("load").expect("row");
    assert!(driver.is_auto_disconnected);
    assert_eq!(driver.end_time, Some(now));
    assert_eq!(
        driver.auto_disconnect_reason.as_deref(),
        Some("Last movement completed 16 minutes ago (over 15 minutes)")
    );
    assert_eq!(driver.audit_trail[0].kind, AuditKind::AutoDisconnected);

    let admin = harness.sessions.find_session(admin_session.id).await.expect("load").expect("row");
    assert_eq!(admin.auto_disconnect_reason.as_deref(), Some("Connected for 13h (over 12h for admin)"));

    let active = harness.sessions.find_active_sessions().await.expect("active sessions");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, preparator_session.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_team_leader_spelling_gets_the_movement_rule() {
    let harness = DbHarness::new();
    let now = at(20, 0);

    let conn = harness.manager.get_connection().expect("connection");
    conn.execute(
        "INSERT INTO workers (id, username, full_name, role) VALUES ('t1', 'tess', 'Tess', 'Team-Leader')",
        [],
    )
    .expect("raw insert");
    drop(conn);

    let session = Session::open("t1", SessionType::StartService, at(7, 0));
    harness.sessions.insert_session(&session).await.expect("open session");
    harness.movement("m1", "t1", at(19, 0), now - TimeDelta::minutes(16)).await;

    let report = harness
        .service()
        .run_disconnect_sweep(now, &CancellationToken::new())
        .await
        .expect("disconnect sweep");

    assert_eq!(report.disconnected, 1);
    assert_eq!(report.disconnections[0].role, WorkerRole::TeamLeader);
    let row = harness.sessions.find_session(session.id).await.expect("load").expect("row");
    assert_eq!(
        row.auto_disconnect_reason.as_deref(),
        Some("Last movement completed 16 minutes ago (over 15 minutes)")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn session_closed_between_read_and_write_is_counted_not_failed() {
    let harness = DbHarness::new();
    harness.worker("a1", WorkerRole::Admin).await;
    let session = Session::open("a1", SessionType::General, at(1, 0));
    harness.sessions.insert_session(&session).await.expect("open session");

    // A manual close lands first; the engine's close must then be a no-op.
    assert!(harness
        .sessions
        .close_session(session.id, &SessionClosure::manual(at(19, 0)))
        .await
        .expect("manual close"));
    let closed_again = harness
        .sessions
        .close_session(session.id, &SessionClosure::auto_disconnect(at(20, 0), "late"))
        .await
        .expect("engine close");
    assert!(!closed_again);

    let row = harness.sessions.find_session(session.id).await.expect("load").expect("row");
    assert!(!row.is_auto_disconnected);
    assert_eq!(row.end_time, Some(at(19, 0)));
}
