//! Backfill of missing driver punches from operational evidence.
//!
//! Three corrections are considered for a processed day, each evaluated
//! against the day as it was read (not as it becomes after earlier
//! corrections):
//!
//! 1. No break at all, nothing open, and an idle gap of at least the
//!    configured threshold: insert `start_break` at the gap start and
//!    `end_break` one break length later.
//! 2. A break start without a break end: insert `end_break` one break length
//!    after the recorded start.
//! 3. No service end but a completed movement that day: insert `end_service`
//!    at the movement's completion time.
//!
//! Every synthesized instant is clamped into the processed day so that a
//! re-run reads the corrections back and performs no further writes.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use fieldclock_domain::{
    AutoGenerationReason, BackfillPolicy, Correction, Movement, Preparation, Result, Session,
    SessionType, Worker,
};
use tracing::{debug, info};

use super::calendar::DayWindow;
use super::inactivity::{action_points, longest_inactivity, InactivityPeriod};
use super::ports::{MovementRepository, PreparationRepository, SessionRepository};
use super::sequence::DailySequence;

/// What happened to one worker-day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayCorrection {
    /// No sessions and no operational activity; nothing was attempted.
    Skipped,
    /// The day was examined; the list holds what was inserted (possibly
    /// nothing).
    Corrected(Vec<Correction>),
}

impl DayCorrection {
    pub fn corrections(&self) -> &[Correction] {
        match self {
            Self::Skipped => &[],
            Self::Corrected(items) => items,
        }
    }
}

/// A session to insert together with its report line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCorrection {
    pub session: Session,
    pub correction: Correction,
}

/// Everything read about one worker-day.
#[derive(Debug, Clone, Copy)]
pub struct DayEvidence<'a> {
    pub sessions: &'a [Session],
    pub movements: &'a [Movement],
    pub preparations: &'a [Preparation],
}

impl DayEvidence<'_> {
    fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.movements.is_empty() && self.preparations.is_empty()
    }
}

/// Decide which sessions to synthesize for one worker-day. Pure; performs
/// no I/O. Returns `None` when the day has no activity at all.
pub fn plan_day(
    worker_id: &str,
    evidence: DayEvidence<'_>,
    window: &DayWindow,
    policy: &BackfillPolicy,
    now: DateTime<Utc>,
) -> Option<Vec<PlannedCorrection>> {
    if evidence.is_empty() {
        return None;
    }

    let sequence = DailySequence::from_sessions(evidence.sessions);
    let has_break_start = sequence.contains(SessionType::StartBreak);
    let has_break_end = sequence.contains(SessionType::EndBreak);
    let break_length = TimeDelta::minutes(policy.break_duration_minutes);
    let mut planned = Vec::new();

    if !has_break_start && !has_break_end && !evidence.movements.iter().any(Movement::is_open) {
        if let Some(gap) = day_inactivity(evidence.movements, window)
            .filter(|gap| gap.duration_minutes >= policy.min_inactivity_minutes)
        {
            let break_start = gap.start_time;
            let break_end = window.clamp(break_start + break_length);
            let detail = format!("Inactivity of {} minutes detected", gap.duration_minutes);

            planned.push(synthesize(
                worker_id,
                SessionType::StartBreak,
                break_start,
                break_end,
                AutoGenerationReason::MissingBreak,
                detail,
                now,
            ));
            planned.push(synthesize(
                worker_id,
                SessionType::EndBreak,
                break_end,
                break_end,
                AutoGenerationReason::MissingBreak,
                format!("Break ended automatically {} minutes after it started", break_length.num_minutes()),
                now,
            ));
        }
    }

    if has_break_start && !has_break_end {
        if let Some(break_start) = sequence.first_time_of(SessionType::StartBreak) {
            let break_end = window.clamp(break_start + break_length);
            planned.push(synthesize(
                worker_id,
                SessionType::EndBreak,
                break_end,
                break_end,
                AutoGenerationReason::MissingBreakEnd,
                format!(
                    "Missing break end, created {} minutes after the break start",
                    break_length.num_minutes()
                ),
                now,
            ));
        }
    }

    if !sequence.contains(SessionType::EndService) {
        if let Some(last) = last_completed(evidence.movements) {
            let service_end = window.clamp(last.completion_time());
            planned.push(synthesize(
                worker_id,
                SessionType::EndService,
                service_end,
                service_end,
                AutoGenerationReason::MissingServiceEnd,
                "Missing service end, created after the last completed movement",
                now,
            ));
        }
    }

    Some(planned)
}

fn day_inactivity(movements: &[Movement], window: &DayWindow) -> Option<InactivityPeriod> {
    let points: Vec<_> =
        action_points(movements).into_iter().filter(|point| window.contains(point.time)).collect();
    longest_inactivity(&points)
}

fn last_completed(movements: &[Movement]) -> Option<&Movement> {
    movements.iter().filter(|m| m.is_completed()).max_by_key(|m| m.completion_time())
}

fn synthesize(
    worker_id: &str,
    session_type: SessionType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    reason: AutoGenerationReason,
    detail: impl Into<String>,
    now: DateTime<Utc>,
) -> PlannedCorrection {
    let detail = detail.into();
    PlannedCorrection {
        session: Session::synthesized(worker_id, session_type, start, end, reason, detail.clone(), now),
        correction: Correction { session_type, time: start, reason, detail },
    }
}

/// Reads a worker-day from the store, plans, and writes the corrections.
pub struct BackfillCorrector {
    sessions: Arc<dyn SessionRepository>,
    movements: Arc<dyn MovementRepository>,
    preparations: Arc<dyn PreparationRepository>,
    policy: BackfillPolicy,
}

impl BackfillCorrector {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        movements: Arc<dyn MovementRepository>,
        preparations: Arc<dyn PreparationRepository>,
        policy: BackfillPolicy,
    ) -> Self {
        Self { sessions, movements, preparations, policy }
    }

    pub fn policy(&self) -> &BackfillPolicy {
        &self.policy
    }

    /// Correct one worker's day. Store failures propagate to the caller,
    /// which isolates them per worker.
    pub async fn correct_day(
        &self,
        worker: &Worker,
        window: &DayWindow,
        now: DateTime<Utc>,
    ) -> Result<DayCorrection> {
        let sessions =
            self.sessions.find_sessions_in_range(&worker.id, window.start, window.end).await?;
        let movements =
            self.movements.find_movements_in_range(&worker.id, window.start, window.end).await?;
        let preparations = self
            .preparations
            .find_preparations_in_range(&worker.id, window.start, window.end)
            .await?;

        debug!(
            worker_id = %worker.id,
            day = %window.day,
            sessions = sessions.len(),
            movements = movements.len(),
            preparations = preparations.len(),
            "Loaded worker day"
        );

        let evidence = DayEvidence {
            sessions: &sessions,
            movements: &movements,
            preparations: &preparations,
        };
        let Some(planned) = plan_day(&worker.id, evidence, window, &self.policy, now) else {
            debug!(worker_id = %worker.id, day = %window.day, "No activity, skipping");
            return Ok(DayCorrection::Skipped);
        };

        let mut applied = Vec::with_capacity(planned.len());
        for item in planned {
            self.sessions.insert_session(&item.session).await?;
            info!(
                worker_id = %worker.id,
                session_id = %item.session.id,
                session_type = %item.correction.session_type,
                reason = item.correction.reason.as_str(),
                "Inserted backfilled session"
            );
            applied.push(item.correction);
        }

        Ok(DayCorrection::Corrected(applied))
    }
}
