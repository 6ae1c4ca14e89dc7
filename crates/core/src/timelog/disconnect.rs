//! Auto-disconnect decisions for active sessions.
//!
//! Rules, in order:
//! 1. Hard cap: connected longer than the cap closes the session whatever
//!    the role.
//! 2. Field roles look at their last completed activity (movements for
//!    drivers and team leaders, preparations for preparators). With no
//!    completed activity at all, the session closes only when nothing is
//!    open and it has been connected longer than the no-activity cap.
//! 3. Office and unclassified roles close after the role cap.
//!
//! Missing data is a decision input, never an error. Store failures do
//! propagate.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use fieldclock_domain::{DisconnectPolicy, Result, Session, Worker, WorkerRole};
use serde::Serialize;
use tracing::debug;

use super::ports::{MovementRepository, PreparationRepository};

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    HardCap,
    ActivityGrace,
    NoActivity,
    OtherRoleCap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisconnectDecision {
    pub disconnect: bool,
    pub reason: String,
    pub rule: DecisionRule,
}

impl DisconnectDecision {
    fn disconnect(rule: DecisionRule, reason: String) -> Self {
        Self { disconnect: true, reason, rule }
    }

    fn retain(rule: DecisionRule, reason: String) -> Self {
        Self { disconnect: false, reason, rule }
    }
}

/// The kind of operational activity a field role is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Movement,
    Preparation,
}

impl Activity {
    fn last_completed_label(self) -> &'static str {
        match self {
            Self::Movement => "Last movement completed",
            Self::Preparation => "Last preparation completed",
        }
    }

    fn none_label(self) -> &'static str {
        match self {
            Self::Movement => "No movement",
            Self::Preparation => "No preparation",
        }
    }

    fn in_progress_label(self) -> &'static str {
        match self {
            Self::Movement => "Movement in progress or recently connected",
            Self::Preparation => "Preparation in progress or recently connected",
        }
    }
}

/// Evidence about a field worker's activity, gathered before deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityEvidence {
    pub last_completed: Option<DateTime<Utc>>,
    pub has_open: bool,
}

/// Whole hours, rounded half up.
fn rounded_hours(duration: TimeDelta) -> i64 {
    (duration.num_minutes() + 30).div_euclid(60)
}

/// Apply the hard cap. `None` means the role rule decides.
pub fn hard_cap_decision(
    connected: TimeDelta,
    policy: &DisconnectPolicy,
) -> Option<DisconnectDecision> {
    (connected > TimeDelta::hours(policy.hard_cap_hours)).then(|| {
        DisconnectDecision::disconnect(
            DecisionRule::HardCap,
            format!(
                "Connected for {}h (over {}h)",
                rounded_hours(connected),
                policy.hard_cap_hours
            ),
        )
    })
}

fn activity_decision(
    activity: Activity,
    evidence: ActivityEvidence,
    connected: TimeDelta,
    now: DateTime<Utc>,
    policy: &DisconnectPolicy,
) -> DisconnectDecision {
    let Some(completed_at) = evidence.last_completed else {
        let cap = TimeDelta::hours(policy.no_activity_cap_hours);
        if !evidence.has_open && connected > cap {
            return DisconnectDecision::disconnect(
                DecisionRule::NoActivity,
                format!(
                    "{} and connected for {}h",
                    activity.none_label(),
                    rounded_hours(connected)
                ),
            );
        }
        return DisconnectDecision::retain(
            DecisionRule::NoActivity,
            activity.in_progress_label().to_string(),
        );
    };

    let idle = now - completed_at;
    let grace = policy.activity_grace_minutes;
    if idle > TimeDelta::minutes(grace) {
        DisconnectDecision::disconnect(
            DecisionRule::ActivityGrace,
            format!(
                "{} {} minutes ago (over {grace} minutes)",
                activity.last_completed_label(),
                idle.num_minutes()
            ),
        )
    } else {
        DisconnectDecision::retain(
            DecisionRule::ActivityGrace,
            format!(
                "{} {} minutes ago (within {grace} minutes)",
                activity.last_completed_label(),
                idle.num_minutes()
            ),
        )
    }
}

fn role_cap_decision(
    role: WorkerRole,
    connected: TimeDelta,
    policy: &DisconnectPolicy,
) -> DisconnectDecision {
    let cap = policy.other_role_cap_hours;
    let hours = rounded_hours(connected);
    if connected > TimeDelta::hours(cap) {
        DisconnectDecision::disconnect(
            DecisionRule::OtherRoleCap,
            format!("Connected for {hours}h (over {cap}h for {role})"),
        )
    } else {
        DisconnectDecision::retain(
            DecisionRule::OtherRoleCap,
            format!("Connected for {hours}h (within {cap}h for {role})"),
        )
    }
}

/// Decides whether an active session should be closed now.
pub struct DisconnectEngine {
    movements: Arc<dyn MovementRepository>,
    preparations: Arc<dyn PreparationRepository>,
    policy: DisconnectPolicy,
}

impl DisconnectEngine {
    pub fn new(
        movements: Arc<dyn MovementRepository>,
        preparations: Arc<dyn PreparationRepository>,
        policy: DisconnectPolicy,
    ) -> Self {
        Self { movements, preparations, policy }
    }

    pub fn policy(&self) -> &DisconnectPolicy {
        &self.policy
    }

    /// Evaluate one active session. Has no side effects.
    pub async fn evaluate(
        &self,
        worker: &Worker,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<DisconnectDecision> {
        let connected = now - session.start_time;

        if let Some(decision) = hard_cap_decision(connected, &self.policy) {
            return Ok(decision);
        }

        let decision = match worker.role {
            WorkerRole::Driver | WorkerRole::TeamLeader => {
                let evidence = self.movement_evidence(&worker.id).await?;
                activity_decision(Activity::Movement, evidence, connected, now, &self.policy)
            }
            WorkerRole::Preparator => {
                let evidence = self.preparation_evidence(&worker.id).await?;
                activity_decision(Activity::Preparation, evidence, connected, now, &self.policy)
            }
            WorkerRole::Admin | WorkerRole::Direction | WorkerRole::Unclassified => {
                role_cap_decision(worker.role, connected, &self.policy)
            }
        };

        debug!(
            worker_id = %worker.id,
            session_id = %session.id,
            role = %worker.role,
            disconnect = decision.disconnect,
            reason = %decision.reason,
            "Evaluated active session"
        );

        Ok(decision)
    }

    async fn movement_evidence(&self, worker_id: &str) -> Result<ActivityEvidence> {
        let last = self.movements.find_last_completed_movement(worker_id).await?;
        let has_open = match last {
            Some(_) => false,
            None => self.movements.has_open_movement(worker_id).await?,
        };
        Ok(ActivityEvidence { last_completed: last.map(|m| m.completion_time()), has_open })
    }

    async fn preparation_evidence(&self, worker_id: &str) -> Result<ActivityEvidence> {
        let last = self.preparations.find_last_completed_preparation(worker_id).await?;
        let has_open = match last {
            Some(_) => false,
            None => self.preparations.has_open_preparation(worker_id).await?,
        };
        Ok(ActivityEvidence { last_completed: last.map(|p| p.completion_time()), has_open })
    }
}
