//! Attendance sessions (timelogs)
//!
//! A session is append-only history: the only mutation after creation is
//! closing an active session. Automated corrections always insert new,
//! already-completed rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FieldClockError;

/// Punch type of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    StartService,
    StartBreak,
    EndBreak,
    EndService,
    General,
}

impl SessionType {
    /// The four punches that make up a complete driver day, in order.
    pub const DAILY_SEQUENCE: [SessionType; 4] =
        [Self::StartService, Self::StartBreak, Self::EndBreak, Self::EndService];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartService => "start_service",
            Self::StartBreak => "start_break",
            Self::EndBreak => "end_break",
            Self::EndService => "end_service",
            Self::General => "general",
        }
    }

    /// Human label used by reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::StartService => "Service start",
            Self::StartBreak => "Break start",
            Self::EndBreak => "Break end",
            Self::EndService => "Service end",
            Self::General => "General",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_service" => Ok(Self::StartService),
            "start_break" => Ok(Self::StartBreak),
            "end_break" => Ok(Self::EndBreak),
            "end_service" => Ok(Self::EndService),
            "general" => Ok(Self::General),
            other => Err(FieldClockError::InvalidInput(format!("unknown session type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(FieldClockError::InvalidInput(format!("unknown session status: {other}"))),
        }
    }
}

/// Machine-readable reason attached to synthesized sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoGenerationReason {
    MissingBreak,
    MissingBreakEnd,
    MissingServiceEnd,
}

impl AutoGenerationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingBreak => "missing_break",
            Self::MissingBreakEnd => "missing_break_end",
            Self::MissingServiceEnd => "missing_service_end",
        }
    }
}

impl FromStr for AutoGenerationReason {
    type Err = FieldClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_break" => Ok(Self::MissingBreak),
            "missing_break_end" => Ok(Self::MissingBreakEnd),
            "missing_service_end" => Ok(Self::MissingServiceEnd),
            other => Err(FieldClockError::InvalidInput(format!(
                "unknown auto generation reason: {other}"
            ))),
        }
    }
}

/// Geographic position recorded with a punch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActor {
    System,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AutoGenerated,
    AutoDisconnected,
}

/// One entry of a session's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: AuditActor,
    pub kind: AuditKind,
    pub message: String,
}

impl AuditEntry {
    pub fn system(at: DateTime<Utc>, kind: AuditKind, message: impl Into<String>) -> Self {
        Self { at, actor: AuditActor::System, kind, message: message.into() }
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actor = match self.actor {
            AuditActor::System => "system",
            AuditActor::Worker => "worker",
        };
        write!(f, "[{} {}] {}", self.at.format("%Y-%m-%d %H:%M"), actor, self.message)
    }
}

/// A single attendance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub worker_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub is_auto_generated: bool,
    pub auto_generation_reason: Option<AutoGenerationReason>,
    pub is_auto_disconnected: bool,
    pub auto_disconnect_reason: Option<String>,
    /// Human-entered text only; automated explanations go to `audit_trail`.
    pub notes: Option<String>,
    pub start_location: Option<Location>,
    pub end_location: Option<Location>,
    pub audit_trail: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A manual punch: open until the worker (or the engine) closes it.
    pub fn open(worker_id: impl Into<String>, session_type: SessionType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            worker_id: worker_id.into(),
            start_time: now,
            end_time: None,
            status: SessionStatus::Active,
            session_type,
            is_auto_generated: false,
            auto_generation_reason: None,
            is_auto_disconnected: false,
            auto_disconnect_reason: None,
            notes: None,
            start_location: None,
            end_location: None,
            audit_trail: Vec::new(),
            created_at: now,
        }
    }

    /// A backfilled punch. Always completed, never left open.
    pub fn synthesized(
        worker_id: impl Into<String>,
        session_type: SessionType,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        reason: AutoGenerationReason,
        explanation: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            worker_id: worker_id.into(),
            start_time,
            end_time: Some(end_time),
            status: SessionStatus::Completed,
            session_type,
            is_auto_generated: true,
            auto_generation_reason: Some(reason),
            is_auto_disconnected: false,
            auto_disconnect_reason: None,
            notes: None,
            start_location: None,
            end_location: None,
            audit_trail: vec![AuditEntry::system(now, AuditKind::AutoGenerated, explanation)],
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whole minutes between start and `now` (or the end time when closed).
    pub fn connected_minutes(&self, now: DateTime<Utc>) -> i64 {
        (self.end_time.unwrap_or(now) - self.start_time).num_minutes()
    }

    /// Apply a closure in place. Returns `false` without touching anything
    /// when the session is already closed.
    pub fn apply_closure(&mut self, closure: &SessionClosure) -> bool {
        if !self.is_active() {
            return false;
        }
        self.end_time = Some(closure.end_time);
        self.status = SessionStatus::Completed;
        if closure.notes.is_some() {
            self.notes.clone_from(&closure.notes);
        }
        if closure.end_location.is_some() {
            self.end_location.clone_from(&closure.end_location);
        }
        if let Some(auto) = &closure.auto_disconnect {
            self.is_auto_disconnected = true;
            self.auto_disconnect_reason = Some(auto.reason.clone());
            self.audit_trail.push(auto.entry.clone());
        }
        true
    }

    /// Notes as shown to people: the human text followed by one line per
    /// audit entry.
    pub fn display_notes(&self) -> String {
        let mut lines: Vec<String> = self.notes.iter().cloned().collect();
        lines.extend(self.audit_trail.iter().map(ToString::to_string));
        lines.join("\n")
    }
}

/// Details written when a session is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionClosure {
    pub end_time: DateTime<Utc>,
    /// Replaces the notes when set (manual end of punch).
    pub notes: Option<String>,
    pub end_location: Option<Location>,
    pub auto_disconnect: Option<AutoDisconnect>,
}

impl SessionClosure {
    pub fn manual(end_time: DateTime<Utc>) -> Self {
        Self { end_time, notes: None, end_location: None, auto_disconnect: None }
    }

    pub fn auto_disconnect(end_time: DateTime<Utc>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let entry = AuditEntry::system(
            end_time,
            AuditKind::AutoDisconnected,
            format!("Service ended automatically: {reason}"),
        );
        Self {
            end_time,
            notes: None,
            end_location: None,
            auto_disconnect: Some(AutoDisconnect { reason, entry }),
        }
    }
}

/// Audit data carried by an automatic close.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoDisconnect {
    pub reason: String,
    pub entry: AuditEntry,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, hour, minute, 0).single().expect("valid timestamp")
    }

    #[test]
    fn synthesized_sessions_are_completed_and_flagged() {
        let session = Session::synthesized(
            "w1",
            SessionType::EndService,
            at(17, 0),
            at(17, 0),
            AutoGenerationReason::MissingServiceEnd,
            "created after last movement",
            at(3, 0),
        );

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.end_time, Some(at(17, 0)));
        assert!(session.is_auto_generated);
        assert_eq!(session.audit_trail.len(), 1);
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let mut session = Session::open("w1", SessionType::StartService, at(8, 0));
        let first = SessionClosure::auto_disconnect(at(12, 0), "idle");
        let second = SessionClosure::auto_disconnect(at(13, 0), "idle again");

        assert!(session.apply_closure(&first));
        assert!(!session.apply_closure(&second));
        assert_eq!(session.end_time, Some(at(12, 0)));
        assert_eq!(session.auto_disconnect_reason.as_deref(), Some("idle"));
        assert_eq!(session.audit_trail.len(), 1);
    }

    #[test]
    fn display_notes_keeps_human_text_first() {
        let mut session = Session::open("w1", SessionType::General, at(8, 0));
        session.notes = Some("flat tyre".into());
        session.apply_closure(&SessionClosure::auto_disconnect(at(9, 0), "no movement"));

        let rendered = session.display_notes();
        let mut lines = rendered.lines();
        assert_eq!(lines.next(), Some("flat tyre"));
        assert_eq!(
            lines.next(),
            Some("[2025-03-04 09:00 system] Service ended automatically: no movement")
        );
        assert_eq!(session.notes.as_deref(), Some("flat tyre"));
    }

    #[test]
    fn session_type_parses_wire_names() {
        for ty in SessionType::DAILY_SEQUENCE {
            assert_eq!(ty.as_str().parse::<SessionType>().expect("parse"), ty);
        }
        assert!("lunch".parse::<SessionType>().is_err());
    }
}
