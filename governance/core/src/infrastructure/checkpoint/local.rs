// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Checkpoint Store
//!
//! Durable, append-only snapshot storage for single-node deployments.
//!
//! **Layout:**
//! ```text
//! <root>/<session_id>/<sequence_number:020>.json
//! ```
//!
//! Every snapshot is written to a temp file in the session directory, synced,
//! then linked into place with `persist_noclobber`, so a reader never sees a
//! half-written snapshot and an existing sequence number is never replaced.
//! Sessions live in disjoint directories and never contend.
//!
//! **Limitations:**
//! - No replication (snapshots only exist on this machine)
//! - No pruning of old snapshots

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::checkpoint::{CheckpointError, CheckpointSnapshot, CheckpointStore};
use crate::domain::context::{CheckpointRef, LifecycleContext};
use crate::domain::lifecycle::{LifecycleState, SessionId};

const SNAPSHOT_EXTENSION: &str = "json";

/// Attempts to claim a sequence number when another writer of the same
/// session got there first.
const MAX_SEQUENCE_ATTEMPTS: usize = 8;

pub struct LocalCheckpointStore {
    /// Root directory for all sessions (e.g., "~/.aegis/checkpoints")
    root: PathBuf,
}

impl LocalCheckpointStore {
    /// Open (and create if needed) a checkpoint root directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            CheckpointError::Write(format!(
                "Failed to create checkpoint directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: SessionId) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    fn snapshot_path(dir: &Path, sequence_number: u64) -> PathBuf {
        dir.join(format!("{:020}.{}", sequence_number, SNAPSHOT_EXTENSION))
    }

    /// Sequence numbers present in a session directory, ascending.
    fn sequence_numbers(dir: &Path) -> Result<Vec<u64>, CheckpointError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CheckpointError::Read(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut sequences = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::Read(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            // Temp files and foreign files are skipped.
            if let Some(sequence) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                sequences.push(sequence);
            }
        }
        sequences.sort_unstable();
        Ok(sequences)
    }

    fn read_snapshot(dir: &Path, sequence_number: u64) -> Result<CheckpointSnapshot, CheckpointError> {
        let path = Self::snapshot_path(dir, sequence_number);
        let bytes = std::fs::read(&path).map_err(|e| {
            CheckpointError::Read(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot = CheckpointSnapshot::decode(&bytes)?;
        if snapshot.sequence_number != sequence_number {
            return Err(CheckpointError::Corrupt(format!(
                "{} carries sequence number {}",
                path.display(),
                snapshot.sequence_number
            )));
        }
        Ok(snapshot)
    }

    fn write_snapshot(dir: &Path, snapshot: &CheckpointSnapshot) -> Result<(), CheckpointError> {
        let bytes = snapshot.encode()?;
        let target = Self::snapshot_path(dir, snapshot.sequence_number);

        let mut temp_file = NamedTempFile::new_in(dir)
            .map_err(|e| CheckpointError::Write(format!("Failed to create temp file: {}", e)))?;
        temp_file
            .write_all(&bytes)
            .and_then(|_| temp_file.as_file().sync_all())
            .map_err(|e| CheckpointError::Write(format!("Failed to write snapshot: {}", e)))?;

        temp_file.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                CheckpointError::AlreadyExists {
                    session_id: snapshot.session_id,
                    sequence_number: snapshot.sequence_number,
                }
            } else {
                CheckpointError::Write(format!(
                    "Failed to persist {}: {}",
                    target.display(),
                    e.error
                ))
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for LocalCheckpointStore {
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

        let dir = self.session_dir(session_id);
        std::fs::create_dir_all(&dir).map_err(|e| {
            CheckpointError::Write(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let mut next = Self::sequence_numbers(&dir)?.last().map(|s| s + 1).unwrap_or(1);
        for _ in 0..MAX_SEQUENCE_ATTEMPTS {
            let snapshot = CheckpointSnapshot::seal(context, state_at_snapshot, next)?;
            match Self::write_snapshot(&dir, &snapshot) {
                Ok(()) => {
                    info!(
                        session_id = %session_id,
                        sequence_number = next,
                        path = %Self::snapshot_path(&dir, next).display(),
                        "Checkpoint saved"
                    );
                    return Ok(snapshot.reference());
                }
                Err(CheckpointError::AlreadyExists { .. }) => {
                    debug!(session_id = %session_id, sequence_number = next, "Sequence number taken, retrying");
                    next += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CheckpointError::Write(format!(
            "could not claim a sequence number for session {} after {} attempts",
            session_id, MAX_SEQUENCE_ATTEMPTS
        )))
    }

    async fn latest(&self, session_id: SessionId) -> Result<Option<CheckpointSnapshot>, CheckpointError> {
        let dir = self.session_dir(session_id);
        match Self::sequence_numbers(&dir)?.last() {
            Some(&sequence_number) => Self::read_snapshot(&dir, sequence_number).map(Some),
            None => Ok(None),
        }
    }

    async fn list(&self, session_id: SessionId) -> Result<Vec<CheckpointRef>, CheckpointError> {
        let dir = self.session_dir(session_id);
        let mut refs = Vec::new();
        for sequence_number in Self::sequence_numbers(&dir)? {
            match Self::read_snapshot(&dir, sequence_number) {
                Ok(snapshot) => refs.push(snapshot.reference()),
                Err(e) => {
                    warn!(session_id = %session_id, sequence_number, error = %e, "Skipping unreadable checkpoint");
                }
            }
        }
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{RiskClassification, RiskLevel};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_latest_and_list() {
        let dir = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(dir.path()).unwrap();
        let session_id = SessionId::new();

        assert!(store.latest(session_id).await.unwrap().is_none());

        let first = store
            .save(session_id, LifecycleState::Checkpoint, &LifecycleContext::new(session_id, "one"))
            .await
            .unwrap();
        let second = store
            .save(session_id, LifecycleState::Checkpoint, &LifecycleContext::new(session_id, "two"))
            .await
            .unwrap();

        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert!(dir
            .path()
            .join(session_id.to_string())
            .join("00000000000000000002.json")
            .exists());

        let latest = store.latest(session_id).await.unwrap().unwrap();
        assert_eq!(latest.context.user_query(), "two");
        assert_eq!(store.list(session_id).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_float_confidence_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(dir.path()).unwrap();
        let session_id = SessionId::new();
        let mut ctx = LifecycleContext::new(session_id, "What is the weather?");
        ctx.risk_classification = Some(RiskClassification::new(RiskLevel::SafeInfo, 0.9856906946328695, vec![]));

        let reference = store.save(session_id, LifecycleState::Checkpoint, &ctx).await.unwrap();
        let latest = store.latest(session_id).await.unwrap().unwrap();

        assert_eq!(latest.state_hash, reference.state_hash);
        assert_eq!(latest.context.risk_classification().unwrap().confidence, 0.9856906946328695);
    }

    #[tokio::test]
    async fn test_existing_snapshot_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(dir.path()).unwrap();
        let session_id = SessionId::new();
        let ctx = LifecycleContext::new(session_id, "one");
        store.save(session_id, LifecycleState::Checkpoint, &ctx).await.unwrap();

        let session_dir = store.session_dir(session_id);
        let replay = CheckpointSnapshot::seal(&LifecycleContext::new(session_id, "evil"), LifecycleState::Checkpoint, 1)
            .unwrap();
        let err = LocalCheckpointStore::write_snapshot(&session_dir, &replay).unwrap_err();
        assert!(matches!(err, CheckpointError::AlreadyExists { sequence_number: 1, .. }));
        assert_eq!(store.latest(session_id).await.unwrap().unwrap().context.user_query(), "one");
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let session_id = SessionId::new();
        {
            let store = LocalCheckpointStore::new(dir.path()).unwrap();
            store
                .save(session_id, LifecycleState::Checkpoint, &LifecycleContext::new(session_id, "durable"))
                .await
                .unwrap();
        }

        let reopened = LocalCheckpointStore::new(dir.path()).unwrap();
        let latest = reopened.latest(session_id).await.unwrap().unwrap();
        assert_eq!(latest.context.user_query(), "durable");
    }

    #[tokio::test]
    async fn test_tampered_file_is_reported_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = LocalCheckpointStore::new(dir.path()).unwrap();
        let session_id = SessionId::new();
        store
            .save(session_id, LifecycleState::Checkpoint, &LifecycleContext::new(session_id, "safe"))
            .await
            .unwrap();

        let path = store.session_dir(session_id).join("00000000000000000001.json");
        let tampered = std::fs::read_to_string(&path).unwrap().replace("\"safe\"", "\"unsafe\"");
        std::fs::write(&path, tampered).unwrap();

        let err = store.latest(session_id).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt(_)));
    }
}
