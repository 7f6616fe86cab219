// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Telemetry events appended to `LifecycleContext::telemetry_events`.
//!
//! Events are append-only and causally ordered: `sequence` increases by one
//! for every event of a session, across passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lifecycle::{FinalStatus, LifecycleState, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub sequence: u64,
    pub session_id: SessionId,
    pub pass: u32,
    pub recorded_at: DateTime<Utc>,
    pub kind: TelemetryEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEventKind {
    /// A stage ran and its transition was committed
    StageVisited {
        state: LifecycleState,
        entered_at: DateTime<Utc>,
        exited_at: DateTime<Utc>,
        next_state: LifecycleState,
        condition: String,
    },
    /// A stage ran but is waiting for external input
    StagePending {
        state: LifecycleState,
        entered_at: DateTime<Utc>,
        exited_at: DateTime<Utc>,
        awaiting: String,
    },
    /// A stage failed or produced a result the Transition Table rejects
    StageFailed {
        state: LifecycleState,
        entered_at: DateTime<Utc>,
        exited_at: DateTime<Utc>,
        error: String,
        next_state: LifecycleState,
    },
    FinalReached {
        final_status: FinalStatus,
        #[serde(default)]
        reason: Option<String>,
    },
    RecoveryTriggered {
        state: LifecycleState,
        reason: String,
    },
    ApprovalSubmitted {
        approved: bool,
        rationale: String,
        #[serde(default)]
        reviewer: Option<String>,
    },
    /// First event of a pass that follows `reset()`
    LoopBack {
        previous_pass: u32,
        #[serde(default)]
        previous_final_status: Option<FinalStatus>,
        previous_event_count: usize,
    },
}

impl TelemetryEventKind {
    /// The stage a stage-level event refers to.
    pub fn state(&self) -> Option<LifecycleState> {
        match self {
            TelemetryEventKind::StageVisited { state, .. }
            | TelemetryEventKind::StagePending { state, .. }
            | TelemetryEventKind::StageFailed { state, .. }
            | TelemetryEventKind::RecoveryTriggered { state, .. } => Some(*state),
            TelemetryEventKind::FinalReached { .. } => Some(LifecycleState::Final),
            TelemetryEventKind::ApprovalSubmitted { .. } => Some(LifecycleState::Approval),
            TelemetryEventKind::LoopBack { .. } => None,
        }
    }

    /// When the referenced stage was entered, if the event describes a stage run.
    pub fn entered_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TelemetryEventKind::StageVisited { entered_at, .. }
            | TelemetryEventKind::StagePending { entered_at, .. }
            | TelemetryEventKind::StageFailed { entered_at, .. } => Some(*entered_at),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_is_tagged() {
        let kind = TelemetryEventKind::RecoveryTriggered {
            state: LifecycleState::Execution,
            reason: "anomaly".to_string(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "recovery_triggered");
        assert_eq!(json["state"], "EXECUTION");
        assert_eq!(kind.state(), Some(LifecycleState::Execution));
        assert_eq!(kind.entered_at(), None);
    }
}
