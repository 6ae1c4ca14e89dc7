//! Manual punches.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use fieldclock_domain::{
    FieldClockError, Location, Result, Session, SessionClosure, SessionType, Worker,
};
use tracing::{info, instrument};

use super::calendar::DayWindow;
use super::ports::SessionRepository;
use super::sequence::{DailySequence, DayAnalysis};

/// Opens and closes sessions on behalf of a worker.
pub struct PunchService {
    sessions: Arc<dyn SessionRepository>,
    timezone: Tz,
}

impl PunchService {
    pub fn new(sessions: Arc<dyn SessionRepository>, timezone: Tz) -> Self {
        Self { sessions, timezone }
    }

    /// Open a new session.
    ///
    /// Drivers are held to the daily sequence for every type except
    /// `general`. Any worker with a session still open gets a conflict.
    #[instrument(skip(self, worker, location, notes), fields(worker_id = %worker.id))]
    pub async fn start_session(
        &self,
        worker: &Worker,
        session_type: SessionType,
        location: Option<Location>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if let Some(active) = self.sessions.find_active_session(&worker.id).await? {
            return Err(FieldClockError::Conflict(format!(
                "worker {} already has active session {}",
                worker.id, active.id
            )));
        }

        if worker.role.follows_daily_sequence() && session_type != SessionType::General {
            let today = DayWindow::containing(now, worker.local_timezone(self.timezone));
            let existing =
                self.sessions.find_sessions_in_range(&worker.id, today.start, today.end).await?;
            DailySequence::from_sessions(&existing).check(session_type)?;
        }

        let mut session = Session::open(worker.id.clone(), session_type, now);
        session.start_location = location;
        session.notes = notes.filter(|text| !text.trim().is_empty());
        self.sessions.insert_session(&session).await?;

        info!(session_id = %session.id, %session_type, "Session started");
        Ok(session)
    }

    /// Close the worker's active session.
    #[instrument(skip(self, worker, location, notes), fields(worker_id = %worker.id))]
    pub async fn end_session(
        &self,
        worker: &Worker,
        location: Option<Location>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let mut session = self
            .sessions
            .find_active_session(&worker.id)
            .await?
            .ok_or_else(|| FieldClockError::NotFound(format!("active session for {}", worker.id)))?;

        let closure = SessionClosure {
            end_time: now,
            notes: notes.filter(|text| !text.trim().is_empty()),
            end_location: location,
            auto_disconnect: None,
        };

        if !self.sessions.close_session(session.id, &closure).await? {
            return Err(FieldClockError::NotFound(format!(
                "session {} was closed concurrently",
                session.id
            )));
        }

        session.apply_closure(&closure);
        info!(session_id = %session.id, "Session ended");
        Ok(session)
    }

    /// Completeness of one local day for a worker.
    pub async fn day_analysis(&self, worker: &Worker, date: NaiveDate) -> Result<DayAnalysis> {
        let window = DayWindow::for_date(date, worker.local_timezone(self.timezone));
        let sessions =
            self.sessions.find_sessions_in_range(&worker.id, window.start, window.end).await?;
        Ok(DailySequence::from_sessions(&sessions).analyze(date))
    }
}
