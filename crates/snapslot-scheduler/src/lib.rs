//! `snapslot-scheduler`: precise two-phase booking orchestrator.
//!
//! # Overview
//!
//! A submission names a resource and a local target date/time. The
//! [`orchestrator::Orchestrator`] derives a [`types::TimingPlan`], admits the
//! run through the [`registry::InFlightRegistry`], and drives it in a Tokio
//! task:
//!
//! | Step | Instant                     | Action                               |
//! |------|-----------------------------|--------------------------------------|
//! | 1    | target − 60 s (preparation) | navigate up to the commit point      |
//! | 2    | target + 1 ms (execution)   | commit, then verify                  |
//!
//! [`orchestrator::Orchestrator::book_now`] runs the same steps at once,
//! without either wait.
//!
//! Every terminal path releases the registry key and cleans up the
//! collaborator session, except `VERIFICATION_FAILED`, which keeps the
//! session open for inspection.

pub mod clock;
pub mod collaborator;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod timing;
pub mod types;
pub mod waiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborator::{
    Commit, CollaboratorError, ExecutionCollaborator, NotReadyKind, PreparationCollaborator,
    Preparation, PreparedHandle, Verification,
};
pub use error::{Result, SchedulerError};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use registry::InFlightRegistry;
pub use types::{
    Acknowledgement, FailureKind, Outcome, RunReport, RunState, ScheduleRequest, ScheduleRun,
    SubmitRequest, TimingPlan,
};
