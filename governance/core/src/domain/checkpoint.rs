// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Checkpoint Snapshots and the Checkpoint Store contract
//!
//! A checkpoint is an immutable, self-describing snapshot of a
//! `LifecycleContext`, keyed by `(session_id, sequence_number)`.
//!
//! ## Wire format
//!
//! JSON, one document per snapshot:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "session_id": "…",
//!   "sequence_number": 3,
//!   "state_at_snapshot": "CHECKPOINT",
//!   "taken_at": "2026-01-01T00:00:00Z",
//!   "state_hash": "<sha256 of the canonical context encoding>",
//!   "context": { … }
//! }
//! ```
//!
//! Newer code reads older snapshots (fields added later carry serde defaults).
//! A snapshot written by a newer schema is rejected with
//! `CheckpointError::UnsupportedSchemaVersion`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::context::{CheckpointRef, LifecycleContext};
use crate::domain::lifecycle::{LifecycleState, SessionId};

/// Schema version written into every new snapshot.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub schema_version: u32,
    pub session_id: SessionId,
    pub sequence_number: u64,
    pub state_at_snapshot: LifecycleState,
    pub taken_at: DateTime<Utc>,
    pub state_hash: String,
    pub context: LifecycleContext,
}

impl CheckpointSnapshot {
    /// Build a sealed snapshot of `context` at the given sequence number.
    pub fn seal(
        context: &LifecycleContext,
        state_at_snapshot: LifecycleState,
        sequence_number: u64,
    ) -> Result<Self, CheckpointError> {
        Ok(Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            session_id: context.session_id(),
            sequence_number,
            state_at_snapshot,
            taken_at: Utc::now(),
            state_hash: state_hash(context)?,
            context: context.clone(),
        })
    }

    pub fn reference(&self) -> CheckpointRef {
        CheckpointRef {
            session_id: self.session_id,
            sequence_number: self.sequence_number,
            state_hash: self.state_hash.clone(),
            saved_at: self.taken_at,
        }
    }

    /// Deterministic encoding used by durable stores.
    pub fn encode(&self) -> Result<Vec<u8>, CheckpointError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decode and verify a stored snapshot.
    pub fn decode(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let header: SchemaHeader = serde_json::from_slice(bytes)?;
        if header.schema_version > CHECKPOINT_SCHEMA_VERSION {
            return Err(CheckpointError::UnsupportedSchemaVersion(header.schema_version));
        }

        let snapshot: Self = serde_json::from_slice(bytes)?;
        snapshot.verify()?;
        Ok(snapshot)
    }

    /// Check the embedded hash and session id against the carried context.
    pub fn verify(&self) -> Result<(), CheckpointError> {
        if self.context.session_id() != self.session_id {
            return Err(CheckpointError::Corrupt(format!(
                "snapshot {}#{} embeds context of session {}",
                self.session_id,
                self.sequence_number,
                self.context.session_id()
            )));
        }

        let actual = state_hash(&self.context)?;
        if actual != self.state_hash {
            return Err(CheckpointError::Corrupt(format!(
                "state hash mismatch for {}#{}: expected {}, computed {}",
                self.session_id, self.sequence_number, self.state_hash, actual
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SchemaHeader {
    schema_version: u32,
}

/// SHA-256 over the canonical JSON encoding of a context.
pub fn state_hash(context: &LifecycleContext) -> Result<String, CheckpointError> {
    let canonical = serde_json::to_vec(context)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Durable, append-only storage for checkpoint snapshots.
///
/// Writes for distinct `(session_id, sequence_number)` keys never conflict,
/// so implementations must accept concurrent saves for different sessions.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a new snapshot under the next sequence number for the session.
    /// Never overwrites an existing snapshot.
    async fn save(
        &self,
        session_id: SessionId,
        state_at_snapshot: LifecycleState,
        context: &LifecycleContext,
    ) -> Result<CheckpointRef, CheckpointError>;

    /// Most recent successfully saved snapshot, `None` when the session has none.
    async fn latest(&self, session_id: SessionId) -> Result<Option<CheckpointSnapshot>, CheckpointError>;

    /// All snapshot references of a session in ascending sequence order.
    async fn list(&self, session_id: SessionId) -> Result<Vec<CheckpointRef>, CheckpointError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint write failed: {0}")]
    Write(String),

    #[error("Checkpoint {session_id}#{sequence_number} already exists")]
    AlreadyExists {
        session_id: SessionId,
        sequence_number: u64,
    },

    #[error("Checkpoint read failed: {0}")]
    Read(String),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("Unsupported checkpoint schema version {0}")]
    UnsupportedSchemaVersion(u32),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        CheckpointError::Serialization(err.to_string())
    }
}
