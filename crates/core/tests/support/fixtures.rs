//! Fixtures pinned to Tuesday 2025-03-04 in UTC.
//!
//! Runs are triggered at 03:00 on the 5th so the processed day is the 4th.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use fieldclock_core::ReconciliationService;
use fieldclock_domain::{
    BackfillPolicy, DisconnectPolicy, Movement, MovementStatus, Preparation, PreparationStatus,
    Session, SessionStatus, SessionType, Worker, WorkerRole,
};

use super::repositories::{InMemoryStore, RecordingNotifier};

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, hour, minute, 0).single().expect("valid timestamp")
}

/// 03:00 the morning after the fixture day.
pub fn nightly() -> DateTime<Utc> {
    at(3, 0) + TimeDelta::days(1)
}

pub fn worker(id: &str, role: WorkerRole) -> Worker {
    Worker::new(id, id, format!("Worker {id}"), role).with_timezone("UTC")
}

pub fn admin(id: &str, email: &str) -> Worker {
    worker(id, WorkerRole::Admin).with_email(email)
}

/// A closed manual punch.
pub fn punch(worker_id: &str, session_type: SessionType, time: DateTime<Utc>) -> Session {
    let mut session = Session::open(worker_id, session_type, time);
    session.status = SessionStatus::Completed;
    session.end_time = Some(time);
    session
}

pub fn active(worker_id: &str, session_type: SessionType, since: DateTime<Utc>) -> Session {
    Session::open(worker_id, session_type, since)
}

pub fn movement(
    id: &str,
    worker_id: &str,
    departure: DateTime<Utc>,
    arrival: DateTime<Utc>,
) -> Movement {
    Movement {
        id: id.into(),
        worker_id: worker_id.into(),
        status: MovementStatus::Completed,
        departure_time: Some(departure),
        arrival_time: Some(arrival),
        created_at: departure,
        updated_at: arrival,
    }
}

pub fn preparation(id: &str, worker_id: &str, end: DateTime<Utc>) -> Preparation {
    Preparation {
        id: id.into(),
        worker_id: worker_id.into(),
        status: PreparationStatus::Completed,
        started_at: Some(end - TimeDelta::minutes(40)),
        end_time: Some(end),
        created_at: end - TimeDelta::hours(1),
        updated_at: end,
    }
}

/// Driver day with a 90-minute idle gap at noon and no break or end punches.
pub fn incomplete_driver_day(store: InMemoryStore, worker_id: &str) -> InMemoryStore {
    store
        .with_session(punch(worker_id, SessionType::StartService, at(7, 30)))
        .with_movement(movement(&format!("{worker_id}-m1"), worker_id, at(8, 0), at(12, 0)))
        .with_movement(movement(&format!("{worker_id}-m2"), worker_id, at(13, 30), at(16, 0)))
}

pub fn service(store: &InMemoryStore, notifier: &RecordingNotifier) -> ReconciliationService {
    let store = Arc::new(store.clone());
    ReconciliationService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(notifier.clone()),
        BackfillPolicy::default(),
        DisconnectPolicy::default(),
        Tz::UTC,
    )
}
