// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Context
//!
//! The mutable record of one governance run plus the value objects each stage
//! writes into it. The context carries no behaviour beyond accessors; the
//! `LifecycleManager` is the only writer.
//!
//! | Field | Written by | Read by |
//! |-------|-----------|---------|
//! | `user_query` | `start()` | PREFLIGHT, CLASSIFICATION, APPROVAL |
//! | `health_status` | HEALTH | transition out of HEALTH |
//! | `risk_classification` | CLASSIFICATION | APPROVAL |
//! | `user_approval` | APPROVAL / `submit_approval` | transition out of APPROVAL |
//! | `execution_result` | EXECUTION | WITNESS |
//! | `checkpoint_data` | CHECKPOINT | RECOVERY |
//! | `restored_from` | RECOVERY | transition out of RECOVERY |
//! | `recovery_needed` | `trigger_recovery` | transition out of CHECKPOINT |
//! | `final_status` | arrival at FINAL | `is_complete()` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::events::TelemetryEvent;
use crate::domain::lifecycle::{FinalStatus, SessionId};

// ============================================================================
// Value Objects: Stage Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
            HealthStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "warning" => Ok(HealthStatus::Warning),
            "critical" => Ok(HealthStatus::Critical),
            "error" => Ok(HealthStatus::Error),
            other => Err(format!("unknown health status '{}'", other)),
        }
    }
}

/// Result of the health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Individual probe results (check name -> detail)
    #[serde(default)]
    pub checks: BTreeMap<String, String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            checks: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn with_check(mut self, name: impl Into<String>, detail: impl Into<String>) -> Self {
        self.checks.insert(name.into(), detail.into());
        self
    }
}

/// Risk categories produced by the classifier, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Safe informational queries
    SafeInfo,
    /// System metadata / diagnostics
    SystemMeta,
    /// Configuration modifications
    ConfigChange,
    /// Data retrieval or access
    DataAccess,
    /// Security tooling with dual use
    DualUseSecurity,
    /// Attempts to pressure the system past its safeguards
    PressureOverrideAttempt,
    /// Illegal or harmful activity
    IllegalOrHarmful,
    /// Could not be classified
    Unknown,
}

impl RiskLevel {
    /// Whether explicit human confirmation is mandatory before execution.
    pub fn requires_approval(self) -> bool {
        self >= RiskLevel::ConfigChange
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::SafeInfo => "SAFE_INFO",
            RiskLevel::SystemMeta => "SYSTEM_META",
            RiskLevel::ConfigChange => "CONFIG_CHANGE",
            RiskLevel::DataAccess => "DATA_ACCESS",
            RiskLevel::DualUseSecurity => "DUAL_USE_SECURITY",
            RiskLevel::PressureOverrideAttempt => "PRESSURE_OVERRIDE_ATTEMPT",
            RiskLevel::IllegalOrHarmful => "ILLEGAL_OR_HARMFUL",
            RiskLevel::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskClassification {
    pub level: RiskLevel,
    /// Classifier confidence (0.0-1.0)
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Vec<String>,
    pub classified_at: DateTime<Utc>,
}

impl RiskClassification {
    pub fn new(level: RiskLevel, confidence: f64, reasoning: Vec<String>) -> Self {
        Self {
            level,
            confidence,
            reasoning,
            classified_at: Utc::now(),
        }
    }

    pub fn requires_approval(&self) -> bool {
        self.level.requires_approval()
    }
}

/// Who produced an approval decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalSource {
    /// Automatic policy decision for low-risk classifications
    Policy,
    /// Explicit human confirmation
    Human {
        #[serde(default)]
        reviewer: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub rationale: String,
    pub decided_at: DateTime<Utc>,
    pub source: ApprovalSource,
}

impl ApprovalDecision {
    pub fn human(approved: bool, rationale: impl Into<String>, reviewer: Option<String>) -> Self {
        Self {
            approved,
            rationale: rationale.into(),
            decided_at: Utc::now(),
            source: ApprovalSource::Human { reviewer },
        }
    }

    pub fn policy(approved: bool, rationale: impl Into<String>) -> Self {
        Self {
            approved,
            rationale: rationale.into(),
            decided_at: Utc::now(),
            source: ApprovalSource::Policy,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self.source, ApprovalSource::Human { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn new(success: bool, payload: serde_json::Value) -> Self {
        Self {
            success,
            payload,
            completed_at: Utc::now(),
        }
    }
}

/// Reference to a durably saved checkpoint snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub session_id: SessionId,
    pub sequence_number: u64,
    /// SHA-256 of the canonical context encoding
    pub state_hash: String,
    pub saved_at: DateTime<Utc>,
}

// ============================================================================
// Aggregate Root: LifecycleContext
// ============================================================================

/// The record of one governance run.
///
/// # Invariants
/// - `telemetry_events` only grows within a pass
/// - `user_query` never changes after creation
/// - `execution_result` is written at most once per pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleContext {
    pub(crate) session_id: SessionId,
    pub(crate) user_query: String,
    #[serde(default)]
    pub(crate) health_status: Option<HealthReport>,
    #[serde(default)]
    pub(crate) risk_classification: Option<RiskClassification>,
    #[serde(default)]
    pub(crate) user_approval: Option<ApprovalDecision>,
    #[serde(default)]
    pub(crate) execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub(crate) telemetry_events: Vec<TelemetryEvent>,
    #[serde(default)]
    pub(crate) checkpoint_data: Option<CheckpointRef>,
    #[serde(default)]
    pub(crate) recovery_needed: bool,
    #[serde(default)]
    pub(crate) recovery_reason: Option<String>,
    #[serde(default)]
    pub(crate) cancellation_requested: bool,
    #[serde(default)]
    pub(crate) restored_from: Option<CheckpointRef>,
    #[serde(default)]
    pub(crate) restoration_error: Option<String>,
    #[serde(default)]
    pub(crate) final_status: Option<FinalStatus>,
    #[serde(default)]
    pub(crate) abort_reason: Option<String>,
    #[serde(default)]
    pub(crate) fatal: bool,
}

impl LifecycleContext {
    pub fn new(session_id: SessionId, user_query: impl Into<String>) -> Self {
        Self {
            session_id,
            user_query: user_query.into(),
            health_status: None,
            risk_classification: None,
            user_approval: None,
            execution_result: None,
            telemetry_events: Vec::new(),
            checkpoint_data: None,
            recovery_needed: false,
            recovery_reason: None,
            cancellation_requested: false,
            restored_from: None,
            restoration_error: None,
            final_status: None,
            abort_reason: None,
            fatal: false,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn health_status(&self) -> Option<&HealthReport> {
        self.health_status.as_ref()
    }

    pub fn risk_classification(&self) -> Option<&RiskClassification> {
        self.risk_classification.as_ref()
    }

    pub fn user_approval(&self) -> Option<&ApprovalDecision> {
        self.user_approval.as_ref()
    }

    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        self.execution_result.as_ref()
    }

    pub fn telemetry_events(&self) -> &[TelemetryEvent] {
        &self.telemetry_events
    }

    pub fn checkpoint_data(&self) -> Option<&CheckpointRef> {
        self.checkpoint_data.as_ref()
    }

    pub fn recovery_needed(&self) -> bool {
        self.recovery_needed
    }

    pub fn recovery_reason(&self) -> Option<&str> {
        self.recovery_reason.as_deref()
    }

    pub fn cancellation_requested(&self) -> bool {
        self.cancellation_requested
    }

    pub fn restored_from(&self) -> Option<&CheckpointRef> {
        self.restored_from.as_ref()
    }

    pub fn restoration_error(&self) -> Option<&str> {
        self.restoration_error.as_deref()
    }

    pub fn final_status(&self) -> Option<FinalStatus> {
        self.final_status
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Whether APPROVAL must see an explicit human decision.
    pub fn approval_mandatory(&self) -> bool {
        self.risk_classification
            .as_ref()
            .map(RiskClassification::requires_approval)
            .unwrap_or(true)
    }

    /// Clear every field except `session_id` for a loop-back into PREFLIGHT.
    pub(crate) fn reset_for_loop_back(&mut self) {
        *self = Self::new(self.session_id, String::new());
    }

    /// Take over the stage results of a restored snapshot.
    ///
    /// `session_id`, `user_query`, `checkpoint_data`, telemetry and the
    /// recovery flags of the live run are kept.
    pub(crate) fn restore_from(&mut self, snapshot: LifecycleContext, source: CheckpointRef) {
        self.health_status = snapshot.health_status;
        self.risk_classification = snapshot.risk_classification;
        self.user_approval = snapshot.user_approval;
        self.execution_result = snapshot.execution_result;
        self.restored_from = Some(source);
        self.restoration_error = None;
    }

    pub(crate) fn record_restoration_failure(&mut self, reason: impl Into<String>) {
        self.restored_from = None;
        self.restoration_error = Some(reason.into());
    }

    pub(crate) fn push_event(&mut self, event: TelemetryEvent) {
        self.telemetry_events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_levels_requiring_approval() {
        assert!(!RiskLevel::SafeInfo.requires_approval());
        assert!(!RiskLevel::SystemMeta.requires_approval());
        assert!(RiskLevel::ConfigChange.requires_approval());
        assert!(RiskLevel::IllegalOrHarmful.requires_approval());
        assert!(RiskLevel::Unknown.requires_approval());
    }

    #[test]
    fn test_approval_mandatory_without_classification() {
        let ctx = LifecycleContext::new(SessionId::new(), "rm -rf /tmp/cache");
        assert!(ctx.approval_mandatory());
    }

    #[test]
    fn test_reset_keeps_only_session_id() {
        let session_id = SessionId::new();
        let mut ctx = LifecycleContext::new(session_id, "What is the weather?");
        ctx.health_status = Some(HealthReport::new(HealthStatus::Healthy));
        ctx.recovery_needed = true;
        ctx.final_status = Some(FinalStatus::Completed);
        ctx.fatal = true;

        ctx.reset_for_loop_back();

        assert_eq!(ctx, LifecycleContext::new(session_id, ""));
    }

    #[test]
    fn test_health_status_parse() {
        assert_eq!("critical".parse::<HealthStatus>().unwrap(), HealthStatus::Critical);
        assert_eq!("WARNING".parse::<HealthStatus>().unwrap(), HealthStatus::Warning);
        assert!("degraded".parse::<HealthStatus>().is_err());
    }

    #[test]
    fn test_context_deserializes_with_missing_optional_fields() {
        let id = SessionId::new();
        let json = format!(r#"{{"session_id":"{}","user_query":"hello"}}"#, id);
        let ctx: LifecycleContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx.session_id(), id);
        assert!(ctx.telemetry_events().is_empty());
        assert!(!ctx.recovery_needed());
    }
}
