use thiserror::Error;

/// Errors returned synchronously by the orchestrator's public API.
///
/// Run failures that happen after admission are not errors: they surface as
/// [`crate::types::Outcome::Failed`] on the run itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The date/time/timezone did not parse or falls outside the booking window.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The timing plan is infeasible; nothing was scheduled.
    #[error("Too late: {reason}")]
    TooLate { reason: String },

    /// Another run already holds this target.
    #[error("Duplicate schedule: {key} is already in flight")]
    Duplicate { key: String },

    #[error("Run not found: {id}")]
    RunNotFound { id: String },

    /// The run already reached a terminal state.
    #[error("Run already finished: {id}")]
    AlreadyFinished { id: String },
}

impl SchedulerError {
    /// Short error code string returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidRequest(_) => "INVALID_REQUEST",
            SchedulerError::TooLate { .. } => "TOO_LATE",
            SchedulerError::Duplicate { .. } => "DUPLICATE",
            SchedulerError::RunNotFound { .. } => "RUN_NOT_FOUND",
            SchedulerError::AlreadyFinished { .. } => "ALREADY_FINISHED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
