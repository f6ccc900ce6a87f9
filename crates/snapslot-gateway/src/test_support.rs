use std::sync::Mutex;

use async_trait::async_trait;
use snapslot_scheduler::{
    CollaboratorError, Commit, ExecutionCollaborator, PreparationCollaborator, Preparation,
    PreparedHandle, Verification,
};

/// Collaborator whose preparation always errors, for tests that must never book.
pub struct Idle;

#[async_trait]
impl PreparationCollaborator for Idle {
    fn name(&self) -> &str {
        "idle"
    }

    async fn prepare(&self, _resource_id: &str) -> Result<Preparation, CollaboratorError> {
        Err(CollaboratorError::Other("unexpected prepare".into()))
    }

    async fn cleanup(
        &self,
        _resource_id: &str,
        _handle: Option<PreparedHandle>,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[async_trait]
impl ExecutionCollaborator for Idle {
    async fn commit(&self, _handle: &PreparedHandle) -> Result<Commit, CollaboratorError> {
        Ok(Commit::Committed)
    }

    async fn verify(&self, _handle: &PreparedHandle) -> Result<Verification, CollaboratorError> {
        Ok(Verification::Confirmed("ok".into()))
    }
}

/// Collaborator that books whatever it is asked to and remembers what that was.
#[derive(Default)]
pub struct Booker {
    pub prepared: Mutex<Vec<String>>,
}

#[async_trait]
impl PreparationCollaborator for Booker {
    fn name(&self) -> &str {
        "booker"
    }

    async fn prepare(&self, resource_id: &str) -> Result<Preparation, CollaboratorError> {
        self.prepared.lock().unwrap().push(resource_id.to_string());
        Ok(Preparation::Ready(PreparedHandle {
            session_id: "s-1".to_string(),
            resource_id: resource_id.to_string(),
            prepared_at: chrono::Utc::now(),
        }))
    }

    async fn cleanup(
        &self,
        _resource_id: &str,
        _handle: Option<PreparedHandle>,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[async_trait]
impl ExecutionCollaborator for Booker {
    async fn commit(&self, _handle: &PreparedHandle) -> Result<Commit, CollaboratorError> {
        Ok(Commit::Committed)
    }

    async fn verify(&self, handle: &PreparedHandle) -> Result<Verification, CollaboratorError> {
        Ok(Verification::Confirmed(format!("booked {}", handle.resource_id)))
    }
}
