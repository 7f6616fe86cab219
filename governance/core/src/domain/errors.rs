// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle error taxonomy.
//!
//! | Error | Raised by | Effect on the run |
//! |-------|-----------|-------------------|
//! | `InvalidInput` | `start` | no context is created |
//! | `InvalidStateTransition` | `advance` | FINAL / ABORTED, fatal |
//! | `StateHandler` | `advance` | RECOVERY (FINAL / ABORTED when raised in RECOVERY) |
//! | `CheckpointWrite` | `advance` at CHECKPOINT | FINAL / ABORTED, fatal |
//! | `RecoveryTrigger` | `trigger_recovery` | none, caller usage error |
//!
//! Errors raised by `advance()` carry the telemetry of the current pass.
//!
//! A missing checkpoint during restoration is `RecoveryError::ContextNotFound`.
//! The RECOVERY stage reports it as a failed restoration and never retries.

use thiserror::Error;

use crate::domain::events::TelemetryEvent;
use crate::domain::lifecycle::{LifecycleState, SessionId};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No legal transition out of {state}: {detail}")]
    InvalidStateTransition {
        state: LifecycleState,
        detail: String,
        telemetry: Vec<TelemetryEvent>,
    },

    #[error("Handler for {state} failed: {message}")]
    StateHandler {
        state: LifecycleState,
        message: String,
        telemetry: Vec<TelemetryEvent>,
    },

    #[error("Checkpoint write failed: {message}")]
    CheckpointWrite {
        message: String,
        telemetry: Vec<TelemetryEvent>,
    },

    #[error("Recovery cannot be triggered in {state} (reason: {reason})")]
    RecoveryTrigger { state: LifecycleState, reason: String },

    #[error("Lifecycle can only be reset from FINAL, current state is {0}")]
    LifecycleReset(LifecycleState),

    #[error("No approval is pending in {0}")]
    ApprovalNotPending(LifecycleState),

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Session {0} already has a live context")]
    SessionAlreadyActive(SessionId),

    #[error("Session {session_id} is in {state}, only FINAL sessions can be archived")]
    SessionNotFinal {
        session_id: SessionId,
        state: LifecycleState,
    },

    #[error("No handler bound for state {0}")]
    MissingHandler(LifecycleState),
}

impl LifecycleError {
    /// Telemetry attached to errors surfaced from `advance()`.
    pub fn telemetry(&self) -> &[TelemetryEvent] {
        match self {
            LifecycleError::InvalidStateTransition { telemetry, .. }
            | LifecycleError::StateHandler { telemetry, .. }
            | LifecycleError::CheckpointWrite { telemetry, .. } => telemetry,
            _ => &[],
        }
    }
}

/// Failure raised by a stage collaborator instead of returning a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerFailure {
    #[error("{0}")]
    Collaborator(String),

    #[error("{0}")]
    CheckpointWrite(String),
}

impl HandlerFailure {
    pub fn collaborator(message: impl Into<String>) -> Self {
        HandlerFailure::Collaborator(message.into())
    }
}
