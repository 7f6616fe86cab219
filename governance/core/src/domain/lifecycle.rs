// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Domain Model
//!
//! Identifiers and state tags for the nine-stage governance lifecycle.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Governance Context
//! - **Aggregate Root:** `LifecycleContext` (see `domain::context`)
//!
//! # Normal Progression
//!
//! ```text
//! PREFLIGHT -> HEALTH -> CLASSIFICATION -> APPROVAL -> EXECUTION
//!           -> WITNESS -> CHECKPOINT -> [RECOVERY] -> FINAL -> (reset) PREFLIGHT
//! ```
//!
//! `FINAL` is not absorbing: a caller-gated `reset()` loops back to `PREFLIGHT`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Identifier of one governance session, stable across loop-backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ============================================================================
// Value Objects: States
// ============================================================================

/// The nine governance stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Preflight,
    Health,
    Classification,
    Approval,
    Execution,
    Witness,
    Checkpoint,
    Recovery,
    Final,
}

impl LifecycleState {
    /// All states in normal progression order.
    pub const ALL: [LifecycleState; 9] = [
        LifecycleState::Preflight,
        LifecycleState::Health,
        LifecycleState::Classification,
        LifecycleState::Approval,
        LifecycleState::Execution,
        LifecycleState::Witness,
        LifecycleState::Checkpoint,
        LifecycleState::Recovery,
        LifecycleState::Final,
    ];

    /// States that run a collaborator when advanced. `FINAL` only waits for `reset()`.
    pub fn has_handler(self) -> bool {
        self != LifecycleState::Final
    }

    /// States from which `trigger_recovery` is still accepted.
    pub fn precedes_checkpoint(self) -> bool {
        self < LifecycleState::Checkpoint
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Preflight => "PREFLIGHT",
            LifecycleState::Health => "HEALTH",
            LifecycleState::Classification => "CLASSIFICATION",
            LifecycleState::Approval => "APPROVAL",
            LifecycleState::Execution => "EXECUTION",
            LifecycleState::Witness => "WITNESS",
            LifecycleState::Checkpoint => "CHECKPOINT",
            LifecycleState::Recovery => "RECOVERY",
            LifecycleState::Final => "FINAL",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown lifecycle state '{}'", s))
    }
}

/// Terminal classification of a pass, written only on arrival at `FINAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Completed,
    Aborted,
    Recovered,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FinalStatus::Completed => "COMPLETED",
            FinalStatus::Aborted => "ABORTED",
            FinalStatus::Recovered => "RECOVERED",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Entities: History
// ============================================================================

/// One committed transition, as kept in the manager's in-memory history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub pass: u32,
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// Condition label of the Transition Table row that matched
    pub condition: String,
    pub committed_at: DateTime<Utc>,
}

/// Audit trail of a finished pass, kept after `reset()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedPass {
    pub pass: u32,
    pub final_status: Option<FinalStatus>,
    pub history: Vec<TransitionRecord>,
    pub telemetry: Vec<crate::domain::events::TelemetryEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_state_order_matches_progression() {
        for pair in LifecycleState::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0] as usize + 1, pair[1] as usize);
        }
        assert!(LifecycleState::Witness.precedes_checkpoint());
        assert!(!LifecycleState::Checkpoint.precedes_checkpoint());
        assert!(!LifecycleState::Final.has_handler());
    }

    #[test]
    fn test_state_parse_is_case_insensitive() {
        assert_eq!("approval".parse::<LifecycleState>().unwrap(), LifecycleState::Approval);
        assert_eq!("FINAL".parse::<LifecycleState>().unwrap(), LifecycleState::Final);
        assert!("DONE".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn test_state_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&LifecycleState::Classification).unwrap();
        assert_eq!(json, "\"CLASSIFICATION\"");
        let status = serde_json::to_string(&FinalStatus::Recovered).unwrap();
        assert_eq!(status, "\"RECOVERED\"");
    }
}
