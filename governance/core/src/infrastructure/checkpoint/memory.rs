// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory Checkpoint Store for tests and the `memory` backend.
//! Snapshots are lost on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::checkpoint::{CheckpointError, CheckpointSnapshot, CheckpointStore};
use crate::domain::context::{CheckpointRef, LifecycleContext};
use crate::domain::lifecycle::{LifecycleState, SessionId};

#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    snapshots: Arc<RwLock<HashMap<SessionId, Vec<CheckpointSnapshot>>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        session_id: SessionId,
        state_at_snapshot: LifecycleState,
        context: &LifecycleContext,
    ) -> Result<CheckpointRef, CheckpointError> {
        if context.session_id() != session_id {
            return Err(CheckpointError::Write(format!(
                "context of session {} cannot be saved under {}",
                context.session_id(),
                session_id
            )));
        }

        let mut snapshots = self.snapshots.write().await;
        let entries = snapshots.entry(session_id).or_default();
        let sequence_number = entries.last().map(|s| s.sequence_number + 1).unwrap_or(1);

        let snapshot = CheckpointSnapshot::seal(context, state_at_snapshot, sequence_number)?;
        let reference = snapshot.reference();
        entries.push(snapshot);

        debug!(session_id = %session_id, sequence_number, "Checkpoint stored in memory");
        Ok(reference)
    }

    async fn latest(&self, session_id: SessionId) -> Result<Option<CheckpointSnapshot>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&session_id).and_then(|entries| entries.last().cloned()))
    }

    async fn list(&self, session_id: SessionId) -> Result<Vec<CheckpointRef>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&session_id)
            .map(|entries| entries.iter().map(CheckpointSnapshot::reference).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_numbers_increase_per_session() {
        let store = InMemoryCheckpointStore::new();
        let a = SessionId::new();
        let b = SessionId::new();

        let a1 = store.save(a, LifecycleState::Checkpoint, &LifecycleContext::new(a, "one")).await.unwrap();
        let a2 = store.save(a, LifecycleState::Checkpoint, &LifecycleContext::new(a, "two")).await.unwrap();
        let b1 = store.save(b, LifecycleState::Checkpoint, &LifecycleContext::new(b, "three")).await.unwrap();

        assert_eq!((a1.sequence_number, a2.sequence_number, b1.sequence_number), (1, 2, 1));
        assert_eq!(store.list(a).await.unwrap(), vec![a1, a2.clone()]);
        assert_eq!(store.latest(a).await.unwrap().unwrap().reference(), a2);
        assert!(store.latest(SessionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_foreign_context() {
        let store = InMemoryCheckpointStore::new();
        let ctx = LifecycleContext::new(SessionId::new(), "q");
        let err = store.save(SessionId::new(), LifecycleState::Checkpoint, &ctx).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Write(_)));
    }

    #[test]
    fn test_clones_share_snapshots() {
        let store = InMemoryCheckpointStore::new();
        let view = store.clone();
        let id = SessionId::new();

        let saved = tokio_test::block_on(store.save(
            id,
            LifecycleState::Checkpoint,
            &LifecycleContext::new(id, "q"),
        ))
        .unwrap();
        let listed = tokio_test::block_on(view.list(id)).unwrap();
        assert_eq!(listed, vec![saved]);
    }
}
