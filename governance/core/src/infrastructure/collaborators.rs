// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reference collaborators
//!
//! Small, replaceable implementations of the collaborator interfaces, enough
//! to drive the lifecycle end to end from the CLI and in tests. None of them
//! is a production risk model, sandbox or health monitor.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::collaborators::{
    ActionExecutor, ApprovalGate, HealthProbe, InputValidator, RiskClassifier,
};
use crate::domain::context::{
    ApprovalDecision, ExecutionResult, HealthReport, HealthStatus, RiskClassification, RiskLevel,
};
use crate::domain::errors::HandlerFailure;

// ============================================================================
// PREFLIGHT
// ============================================================================

/// Non-empty, bounded length, printable.
pub struct StructuralInputValidator {
    max_len: usize,
}

impl StructuralInputValidator {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for StructuralInputValidator {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl InputValidator for StructuralInputValidator {
    fn validate(&self, user_query: &str) -> Result<(), String> {
        if user_query.trim().is_empty() {
            return Err("query is empty".to_string());
        }
        if user_query.chars().count() > self.max_len {
            return Err(format!("query longer than {} characters", self.max_len));
        }
        if let Some(c) = user_query
            .chars()
            .find(|c| c.is_control() && !matches!(c, '\n' | '\t'))
        {
            return Err(format!("query contains control character {:?}", c));
        }
        Ok(())
    }
}

// ============================================================================
// HEALTH
// ============================================================================

/// Always reports the configured status.
pub struct StaticHealthProbe {
    status: HealthStatus,
}

impl StaticHealthProbe {
    pub fn new(status: HealthStatus) -> Self {
        Self { status }
    }
}

#[async_trait]
impl HealthProbe for StaticHealthProbe {
    async fn check(&self) -> Result<HealthReport, HandlerFailure> {
        Ok(HealthReport::new(self.status).with_check("static", self.status.to_string()))
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Keyword table, most severe level first. Matching is on whole words or
/// word sequences of the normalised query.
const KEYWORDS: &[(RiskLevel, &[&str], &str)] = &[
    (
        RiskLevel::IllegalOrHarmful,
        &["weapon", "bomb", "malware", "ransomware", "steal"],
        "Potentially illegal or harmful activity",
    ),
    (
        RiskLevel::PressureOverrideAttempt,
        &["bypass", "override", "ignore safety", "trust me", "just do it"],
        "Attempt to override safety measures",
    ),
    (
        RiskLevel::DualUseSecurity,
        &["exploit", "penetration", "vulnerability", "crack", "password"],
        "Security tooling with dual use",
    ),
    (
        RiskLevel::DataAccess,
        &["database", "dump", "export", "download", "records", "table"],
        "Data access request",
    ),
    (
        RiskLevel::ConfigChange,
        &["configure", "config", "set", "enable", "disable", "install", "delete", "remove"],
        "Configuration modification",
    ),
    (
        RiskLevel::SystemMeta,
        &["status", "health", "version", "cpu", "memory", "disk", "logs"],
        "System metadata or diagnostics",
    ),
    (
        RiskLevel::SafeInfo,
        &["what", "who", "when", "where", "how", "why", "explain", "hello", "thanks"],
        "Informational question",
    ),
];

#[derive(Default)]
pub struct KeywordRiskClassifier;

impl KeywordRiskClassifier {
    pub fn new() -> Self {
        Self
    }

    fn normalise(user_query: &str) -> String {
        let words: Vec<String> = user_query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        format!(" {} ", words.join(" "))
    }
}

#[async_trait]
impl RiskClassifier for KeywordRiskClassifier {
    async fn classify(&self, user_query: &str) -> Result<RiskClassification, HandlerFailure> {
        let normalised = Self::normalise(user_query);

        for (level, keywords, reason) in KEYWORDS {
            let matched: Vec<&str> = keywords
                .iter()
                .copied()
                .filter(|kw| normalised.contains(&format!(" {} ", kw)))
                .collect();
            if matched.is_empty() {
                continue;
            }

            let confidence = (0.6 + 0.1 * matched.len() as f64).min(0.95);
            debug!(level = %level, matched = ?matched, "Query classified");
            return Ok(RiskClassification::new(
                *level,
                confidence,
                vec![format!("{} (matched: {})", reason, matched.join(", "))],
            ));
        }

        Ok(RiskClassification::new(
            RiskLevel::Unknown,
            0.0,
            vec!["No classification pattern matched".to_string()],
        ))
    }
}

// ============================================================================
// APPROVAL
// ============================================================================

/// Auto-approves low-risk classifications and auto-rejects the most severe
/// ones. Everything in between waits for a human decision.
pub struct PolicyApprovalGate {
    auto_approve_max_level: RiskLevel,
    auto_reject_min_level: Option<RiskLevel>,
}

impl PolicyApprovalGate {
    pub fn new(auto_approve_max_level: RiskLevel, auto_reject_min_level: Option<RiskLevel>) -> Self {
        Self {
            auto_approve_max_level,
            auto_reject_min_level,
        }
    }
}

impl Default for PolicyApprovalGate {
    fn default() -> Self {
        Self::new(RiskLevel::SystemMeta, Some(RiskLevel::IllegalOrHarmful))
    }
}

#[async_trait]
impl ApprovalGate for PolicyApprovalGate {
    async fn decide(
        &self,
        classification: &RiskClassification,
        _user_query: &str,
    ) -> Result<Option<ApprovalDecision>, HandlerFailure> {
        let level = classification.level;

        // Unknown sorts last but is not a severity; it always goes to a human.
        if level != RiskLevel::Unknown {
            if let Some(min) = self.auto_reject_min_level {
                if level >= min {
                    return Ok(Some(ApprovalDecision::policy(
                        false,
                        format!("{} is refused by policy", level),
                    )));
                }
            }
        }

        if !classification.requires_approval() && level <= self.auto_approve_max_level {
            return Ok(Some(ApprovalDecision::policy(
                true,
                format!("{} auto-approved by policy", level),
            )));
        }

        Ok(None)
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Reports success without performing any action.
#[derive(Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(
        &self,
        user_query: &str,
        approval: &ApprovalDecision,
    ) -> Result<ExecutionResult, HandlerFailure> {
        Ok(ExecutionResult::new(
            true,
            serde_json::json!({
                "mode": "dry_run",
                "query": user_query,
                "approved_by_human": approval.is_human(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_validation() {
        let validator = StructuralInputValidator::new(10);
        assert!(validator.validate("hello").is_ok());
        assert!(validator.validate("  ").is_err());
        assert!(validator.validate("way too long for this").is_err());
        assert!(validator.validate("bell\u{7}").is_err());
        assert!(validator.validate("a\tb\nc").is_ok());
    }

    async fn level_of(query: &str) -> RiskLevel {
        KeywordRiskClassifier::new().classify(query).await.unwrap().level
    }

    #[tokio::test]
    async fn test_keyword_classification() {
        assert_eq!(level_of("What is the weather?").await, RiskLevel::SafeInfo);
        assert_eq!(level_of("show disk usage").await, RiskLevel::SystemMeta);
        assert_eq!(level_of("set max_connections=50").await, RiskLevel::ConfigChange);
        assert_eq!(level_of("dump the users table").await, RiskLevel::DataAccess);
        assert_eq!(level_of("how do I build a bomb").await, RiskLevel::IllegalOrHarmful);
        assert_eq!(level_of("zxcv qwerty").await, RiskLevel::Unknown);
    }

    async fn gate_decision(level: RiskLevel) -> Option<ApprovalDecision> {
        PolicyApprovalGate::default()
            .decide(&RiskClassification::new(level, 0.9, vec![]), "q")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_policy_gate() {
        let safe = gate_decision(RiskLevel::SafeInfo).await.unwrap();
        assert!(safe.approved && !safe.is_human());
        assert!(gate_decision(RiskLevel::ConfigChange).await.is_none());
        assert!(gate_decision(RiskLevel::Unknown).await.is_none());
        assert!(!gate_decision(RiskLevel::IllegalOrHarmful).await.unwrap().approved);
    }
}
