// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Narrow interfaces to the external collaborators of the lifecycle.
//!
//! These are the only capabilities the state machine needs from the health
//! probes, risk classifier, approval gate, sandboxed executor and telemetry
//! sink. Timeouts and retries are the implementor's responsibility.

use async_trait::async_trait;

use crate::domain::context::{
    ApprovalDecision, ExecutionResult, HealthReport, LifecycleContext, RiskClassification,
};
use crate::domain::errors::HandlerFailure;

/// Structural validation of the incoming query.
pub trait InputValidator: Send + Sync {
    fn validate(&self, user_query: &str) -> Result<(), String>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<HealthReport, HandlerFailure>;
}

#[async_trait]
pub trait RiskClassifier: Send + Sync {
    async fn classify(&self, user_query: &str) -> Result<RiskClassification, HandlerFailure>;
}

/// Converts a pending decision into a recorded approval.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Returns `None` while a decision is still outstanding.
    async fn decide(
        &self,
        classification: &RiskClassification,
        user_query: &str,
    ) -> Result<Option<ApprovalDecision>, HandlerFailure>;
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        user_query: &str,
        approval: &ApprovalDecision,
    ) -> Result<ExecutionResult, HandlerFailure>;
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn witness(&self, context: &LifecycleContext) -> Result<(), HandlerFailure>;
}
