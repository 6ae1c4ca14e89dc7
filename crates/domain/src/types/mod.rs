//! Domain types and models

pub mod activity;
pub mod report;
pub mod session;
pub mod worker;

pub use activity::{Movement, MovementStatus, Preparation, PreparationStatus};
pub use report::{
    BackfillReport, Correction, DisconnectReport, Disconnection, JobKind, RunOutcome, RunSummary,
    WorkerCorrections, WorkerFailure, WorkerRef,
};
pub use session::{
    AuditActor, AuditEntry, AuditKind, AutoDisconnect, AutoGenerationReason, Location, Session,
    SessionClosure, SessionStatus, SessionType,
};
pub use worker::{Worker, WorkerRole};
