// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Recovery Controller
//!
//! Sub-procedure invoked only from the RECOVERY stage. Restores a context from
//! the most recent checkpoint of a session.
//!
//! ```text
//! ENTER -> FETCH -> VALIDATE -> (RESTORED | FAILED)
//! ```
//!
//! The phases are internal; callers only see the final result.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::checkpoint::{CheckpointError, CheckpointSnapshot, CheckpointStore};
use crate::domain::context::{CheckpointRef, LifecycleContext};
use crate::domain::lifecycle::SessionId;

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No snapshot exists for the session. Reported, never retried.
    #[error("No checkpoint found for session {0}")]
    ContextNotFound(SessionId),

    #[error("Checkpoint for session {requested} embeds session {found}")]
    SessionMismatch { requested: SessionId, found: SessionId },

    #[error("Checkpoint store error: {0}")]
    Store(#[from] CheckpointError),
}

/// Context recovered from a checkpoint, with the reference it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Restoration {
    pub context: LifecycleContext,
    pub source: CheckpointRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Enter,
    Fetch,
    Validate,
    Restored,
    Failed,
}

pub struct RecoveryController {
    store: Arc<dyn CheckpointStore>,
}

impl RecoveryController {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    pub async fn restore(&self, session_id: SessionId) -> Result<Restoration, RecoveryError> {
        trace_phase(session_id, Phase::Enter);

        trace_phase(session_id, Phase::Fetch);
        let snapshot = match self.store.latest(session_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                trace_phase(session_id, Phase::Failed);
                warn!(session_id = %session_id, "No checkpoint available for restoration");
                return Err(RecoveryError::ContextNotFound(session_id));
            }
            Err(e) => {
                trace_phase(session_id, Phase::Failed);
                warn!(session_id = %session_id, error = %e, "Checkpoint fetch failed");
                return Err(e.into());
            }
        };

        trace_phase(session_id, Phase::Validate);
        if let Err(e) = validate(session_id, &snapshot) {
            trace_phase(session_id, Phase::Failed);
            warn!(session_id = %session_id, error = %e, "Checkpoint rejected");
            return Err(e);
        }

        trace_phase(session_id, Phase::Restored);
        info!(
            session_id = %session_id,
            sequence_number = snapshot.sequence_number,
            state_at_snapshot = %snapshot.state_at_snapshot,
            "Context restored from checkpoint"
        );

        let source = snapshot.reference();
        Ok(Restoration {
            context: snapshot.context,
            source,
        })
    }
}

fn validate(requested: SessionId, snapshot: &CheckpointSnapshot) -> Result<(), RecoveryError> {
    for found in [snapshot.session_id, snapshot.context.session_id()] {
        if found != requested {
            return Err(RecoveryError::SessionMismatch { requested, found });
        }
    }
    snapshot.verify()?;
    Ok(())
}

fn trace_phase(session_id: SessionId, phase: Phase) {
    debug!(session_id = %session_id, phase = ?phase, "Recovery phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::LifecycleState;
    use crate::infrastructure::checkpoint::InMemoryCheckpointStore;

    #[tokio::test]
    async fn test_restore_without_checkpoint() {
        let controller = RecoveryController::new(Arc::new(InMemoryCheckpointStore::new()));
        let session_id = SessionId::new();

        let err = controller.restore(session_id).await.unwrap_err();
        assert!(matches!(err, RecoveryError::ContextNotFound(id) if id == session_id));
    }

    #[tokio::test]
    async fn test_restore_returns_latest_snapshot() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let session_id = SessionId::new();
        let first = LifecycleContext::new(session_id, "first");
        let second = LifecycleContext::new(session_id, "second");
        store.save(session_id, LifecycleState::Checkpoint, &first).await.unwrap();
        let latest = store.save(session_id, LifecycleState::Checkpoint, &second).await.unwrap();

        let controller = RecoveryController::new(store);
        let restored = controller.restore(session_id).await.unwrap();
        assert_eq!(restored.context.user_query(), "second");
        assert_eq!(restored.source, latest);
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let session_id = SessionId::new();
        store
            .save(session_id, LifecycleState::Checkpoint, &LifecycleContext::new(session_id, "q"))
            .await
            .unwrap();

        let controller = RecoveryController::new(store);
        let a = controller.restore(session_id).await.unwrap();
        let b = controller.restore(session_id).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&a.context).unwrap(),
            serde_json::to_vec(&b.context).unwrap()
        );
        assert_eq!(a.source, b.source);
    }

    #[test]
    fn test_validate_detects_foreign_context() {
        let requested = SessionId::new();
        let foreign = LifecycleContext::new(SessionId::new(), "q");
        let mut snapshot = CheckpointSnapshot::seal(&foreign, LifecycleState::Checkpoint, 1).unwrap();
        snapshot.session_id = requested;

        let err = validate(requested, &snapshot).unwrap_err();
        assert!(matches!(err, RecoveryError::SessionMismatch { .. }));
    }
}
