//! # FieldClock Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The daily punch sequence rules
//! - Inactivity analysis over a worker's movements
//! - The backfill corrector and the auto-disconnect decision engine
//! - The reconciliation service that runs both over a whole population
//! - Port interfaces (traits) for the event store and notification sender
//!
//! ## Architecture Principles
//! - Only depends on `fieldclock-domain`
//! - No database, HTTP, or scheduler code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod timelog;

// Re-export specific items to avoid ambiguity
pub use timelog::backfill::{BackfillCorrector, DayCorrection};
pub use timelog::calendar::DayWindow;
pub use timelog::disconnect::{DecisionRule, DisconnectDecision, DisconnectEngine};
pub use timelog::inactivity::{ActionKind, ActionPoint, InactivityPeriod};
pub use timelog::ports::{
    MovementRepository, NotificationSender, PreparationRepository, SessionRepository,
    WorkerDirectory,
};
pub use timelog::punch::PunchService;
pub use timelog::reconciliation::{ActiveSessionStatus, DisconnectProbe, ReconciliationService};
pub use timelog::sequence::{DailySequence, DayAnalysis, SequenceViolation};
