use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use snapslot_core::types::{RunId, TargetKey, Timezone};

/// Raw submission exactly as received from the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub resource_id: String,
    /// `YYYY-MM-DD`
    pub target_date: String,
    /// `HH:MM:SS`
    pub target_time: String,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A validated submission. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub resource_id: String,
    pub target_date: NaiveDate,
    pub target_time: NaiveTime,
    pub timezone: Timezone,
}

impl ScheduleRequest {
    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.resource_id.clone(), self.target_date, self.target_time)
    }

    pub fn target_instant(&self) -> DateTime<Utc> {
        self.timezone.to_utc(self.target_date, self.target_time)
    }
}

/// Why a plan cannot be acted on. Rules are evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRejection {
    PreparationPassed,
    TargetPassed,
    TooFarAhead,
}

/// Derived once per request and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingPlan {
    pub target_instant: DateTime<Utc>,
    pub preparation_instant: DateTime<Utc>,
    pub execution_instant: DateTime<Utc>,
    pub wait_to_preparation_secs: f64,
    pub wait_to_execution_secs: f64,
    pub feasible: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PlanRejection>,
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Scheduled,
    Preparing,
    Prepared,
    Executing,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Scheduled => "scheduled",
            RunState::Preparing => "preparing",
            RunState::Prepared => "prepared",
            RunState::Executing => "executing",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Machine-readable failure taxonomy, exposed to clients as `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    TooLate,
    PreparationFailed,
    NoCapacity,
    AlreadyDone,
    ExecutionFailed,
    VerificationFailed,
    Cancelled,
    UnexpectedError,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::TooLate => "TOO_LATE",
            FailureKind::PreparationFailed => "PREPARATION_FAILED",
            FailureKind::NoCapacity => "NO_CAPACITY",
            FailureKind::AlreadyDone => "ALREADY_DONE",
            FailureKind::ExecutionFailed => "EXECUTION_FAILED",
            FailureKind::VerificationFailed => "VERIFICATION_FAILED",
            FailureKind::Cancelled => "CANCELLED",
            FailureKind::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }

    /// Whether collaborator resources are torn down on this outcome.
    pub fn releases_session(self) -> bool {
        !matches!(self, FailureKind::VerificationFailed)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        message: String,
    },
    Failed {
        #[serde(rename = "error_type")]
        kind: FailureKind,
        message: String,
    },
}

impl Outcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Outcome::Succeeded {
            message: message.into(),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Outcome::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Succeeded { .. } => None,
            Outcome::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Succeeded { message } | Outcome::Failed { message, .. } => message,
        }
    }
}

/// The mutable lifecycle record of one run, owned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRun {
    pub id: RunId,
    pub request: ScheduleRequest,
    pub plan: TimingPlan,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub started_preparation_at: Option<DateTime<Utc>>,
    pub completed_preparation_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    /// Commit start minus execution instant, in milliseconds (positive = late).
    pub drift_ms: Option<f64>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    /// Session left open after a failed verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained_session: Option<String>,
}

/// Returned by `submit` once a run is admitted and in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub run_id: RunId,
    pub acknowledged_at: DateTime<Utc>,
    pub planned_execution_instant: DateTime<Utc>,
    pub estimated_wait_seconds: f64,
}

/// Broadcast to subscribers whenever a run reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub resource_id: String,
    pub outcome: Outcome,
    pub drift_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_wire_format() {
        let ok = serde_json::to_value(Outcome::succeeded("booked")).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "succeeded", "message": "booked"}));

        let err = serde_json::to_value(Outcome::failed(FailureKind::NoCapacity, "full")).unwrap();
        assert_eq!(
            err,
            serde_json::json!({"status": "failed", "error_type": "NO_CAPACITY", "message": "full"})
        );
    }

    #[test]
    fn failure_codes_match_serde_names() {
        for kind in [
            FailureKind::TooLate,
            FailureKind::PreparationFailed,
            FailureKind::NoCapacity,
            FailureKind::AlreadyDone,
            FailureKind::ExecutionFailed,
            FailureKind::VerificationFailed,
            FailureKind::Cancelled,
            FailureKind::UnexpectedError,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.code().to_string()));
        }
    }

    #[test]
    fn only_verification_failure_retains_session() {
        assert!(!FailureKind::VerificationFailed.releases_session());
        assert!(FailureKind::ExecutionFailed.releases_session());
        assert!(FailureKind::Cancelled.releases_session());
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Prepared.is_terminal());
    }
}
