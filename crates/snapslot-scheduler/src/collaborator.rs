//! Capability interfaces for the site-specific automation the orchestrator drives.
//!
//! The orchestrator knows nothing about page structure; a single concrete
//! adapter per target site implements both traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque token for a session positioned right before the commit action.
///
/// Single owner: borrowed by commit/verify, moved into cleanup.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedHandle {
    pub session_id: String,
    pub resource_id: String,
    pub prepared_at: DateTime<Utc>,
}

/// Terminal, non-retryable reasons a preparation can come back not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotReadyKind {
    PreparationFailed,
    NoCapacity,
    /// The resource is already secured, e.g. by an earlier attempt.
    AlreadyDone,
}

#[derive(Debug)]
pub enum Preparation {
    Ready(PreparedHandle),
    NotReady { kind: NotReadyKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Committed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Confirmed(String),
    Unconfirmed(String),
}

/// Transport-level or unexpected collaborator failure.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Automation API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Collaborator error: {0}")]
    Other(String),
}

/// Performs all navigation up to, but excluding, the final commit action.
#[async_trait]
pub trait PreparationCollaborator: Send + Sync {
    /// Stable lowercase identifier used in logs.
    fn name(&self) -> &str;

    async fn prepare(&self, resource_id: &str) -> Result<Preparation, CollaboratorError>;

    /// Tear down whatever the preparation holds. `handle` is `None` when the
    /// run never obtained one (not ready, cancelled early, or panicked).
    async fn cleanup(
        &self,
        resource_id: &str,
        handle: Option<PreparedHandle>,
    ) -> Result<(), CollaboratorError>;
}

/// Performs the commit action on a prepared session and confirms it took effect.
#[async_trait]
pub trait ExecutionCollaborator: Send + Sync {
    async fn commit(&self, handle: &PreparedHandle) -> Result<Commit, CollaboratorError>;

    async fn verify(&self, handle: &PreparedHandle) -> Result<Verification, CollaboratorError>;
}
