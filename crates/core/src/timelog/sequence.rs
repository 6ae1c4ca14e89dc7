//! Daily punch sequence rules for drivers.
//!
//! A driver's day is `start_service`, `start_break`, `end_break`,
//! `end_service`, each at most once. The rules are only enforced at manual
//! punch time; the backfill corrector works on days already known to be
//! incomplete and bypasses them.

use chrono::{DateTime, NaiveDate, Utc};
use fieldclock_domain::{FieldClockError, Session, SessionType};
use serde::Serialize;
use thiserror::Error;

/// Why a proposed punch is not allowed today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceViolation {
    #[error("service already started today")]
    ServiceAlreadyStarted,
    #[error("service not started")]
    ServiceNotStarted,
    #[error("break already started today")]
    BreakAlreadyStarted,
    #[error("cannot start a break after service ended")]
    BreakAfterServiceEnd,
    #[error("break not started")]
    BreakNotStarted,
    #[error("break already ended today")]
    BreakAlreadyEnded,
    #[error("service already ended today")]
    ServiceAlreadyEnded,
    #[error("break must be ended before service ends")]
    BreakStillOpen,
}

impl From<SequenceViolation> for FieldClockError {
    fn from(violation: SequenceViolation) -> Self {
        FieldClockError::SequenceViolation(violation.to_string())
    }
}

/// Check a proposed punch type against the types already recorded today.
///
/// Rules are evaluated in a fixed precedence; the first failing rule is
/// reported. `general` punches are always allowed.
pub fn check_transition(
    existing: &[SessionType],
    proposed: SessionType,
) -> Result<(), SequenceViolation> {
    let has = |ty: SessionType| existing.contains(&ty);

    match proposed {
        SessionType::StartService => {
            if has(SessionType::StartService) {
                return Err(SequenceViolation::ServiceAlreadyStarted);
            }
        }
        SessionType::StartBreak => {
            if !has(SessionType::StartService) {
                return Err(SequenceViolation::ServiceNotStarted);
            }
            if has(SessionType::StartBreak) {
                return Err(SequenceViolation::BreakAlreadyStarted);
            }
            if has(SessionType::EndService) {
                return Err(SequenceViolation::BreakAfterServiceEnd);
            }
        }
        SessionType::EndBreak => {
            if !has(SessionType::StartBreak) {
                return Err(SequenceViolation::BreakNotStarted);
            }
            if has(SessionType::EndBreak) {
                return Err(SequenceViolation::BreakAlreadyEnded);
            }
        }
        SessionType::EndService => {
            if !has(SessionType::StartService) {
                return Err(SequenceViolation::ServiceNotStarted);
            }
            if has(SessionType::EndService) {
                return Err(SequenceViolation::ServiceAlreadyEnded);
            }
            if has(SessionType::StartBreak) && !has(SessionType::EndBreak) {
                return Err(SequenceViolation::BreakStillOpen);
            }
        }
        SessionType::General => {}
    }

    Ok(())
}

/// One punch of a day, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceEntry {
    pub session_type: SessionType,
    pub time: DateTime<Utc>,
    pub is_auto_generated: bool,
}

/// The ordered punch types of one worker-day. Derived, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailySequence {
    entries: Vec<SequenceEntry>,
}

impl DailySequence {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        let mut entries: Vec<SequenceEntry> = sessions
            .iter()
            .map(|session| SequenceEntry {
                session_type: session.session_type,
                time: session.start_time,
                is_auto_generated: session.is_auto_generated,
            })
            .collect();
        entries.sort_by_key(|entry| entry.time);
        Self { entries }
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    pub fn types(&self) -> Vec<SessionType> {
        self.entries.iter().map(|entry| entry.session_type).collect()
    }

    pub fn contains(&self, session_type: SessionType) -> bool {
        self.entries.iter().any(|entry| entry.session_type == session_type)
    }

    /// Time of the first punch of the given type.
    pub fn first_time_of(&self, session_type: SessionType) -> Option<DateTime<Utc>> {
        self.entries.iter().find(|entry| entry.session_type == session_type).map(|e| e.time)
    }

    /// Daily types not yet recorded, in sequence order.
    pub fn missing_types(&self) -> Vec<SessionType> {
        SessionType::DAILY_SEQUENCE.into_iter().filter(|ty| !self.contains(*ty)).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_types().is_empty()
    }

    /// Validate a proposed punch against this day.
    pub fn check(&self, proposed: SessionType) -> Result<(), SequenceViolation> {
        check_transition(&self.types(), proposed)
    }

    pub fn analyze(&self, date: NaiveDate) -> DayAnalysis {
        DayAnalysis {
            date,
            has_service_start: self.contains(SessionType::StartService),
            has_break_start: self.contains(SessionType::StartBreak),
            has_break_end: self.contains(SessionType::EndBreak),
            has_service_end: self.contains(SessionType::EndService),
            missing_types: self.missing_types(),
            is_complete: self.is_complete(),
            sequence: self.entries.clone(),
        }
    }
}

/// Completeness view of one worker-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAnalysis {
    pub date: NaiveDate,
    pub has_service_start: bool,
    pub has_break_start: bool,
    pub has_break_end: bool,
    pub has_service_end: bool,
    pub missing_types: Vec<SessionType>,
    pub is_complete: bool,
    pub sequence: Vec<SequenceEntry>,
}
