// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stage adapters
//!
//! One `StateHandler` per non-final state, each wrapping exactly one
//! collaborator. Adapters translate collaborator results into `StageOutput`
//! and never touch the context.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::application::recovery::{RecoveryController, RecoveryError};
use crate::domain::checkpoint::CheckpointStore;
use crate::domain::collaborators::{
    ActionExecutor, ApprovalGate, HealthProbe, InputValidator, RiskClassifier, TelemetrySink,
};
use crate::domain::context::LifecycleContext;
use crate::domain::errors::{HandlerFailure, LifecycleError};
use crate::domain::handler::{HandlerRegistry, RecoveryOutcome, StageOutput, StateHandler};
use crate::domain::lifecycle::LifecycleState;

pub struct PreflightStage {
    validator: Arc<dyn InputValidator>,
}

#[async_trait]
impl StateHandler for PreflightStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        self.validator
            .validate(context.user_query())
            .map_err(|reason| HandlerFailure::collaborator(format!("input rejected: {}", reason)))?;
        Ok(StageOutput::Preflight)
    }
}

pub struct HealthStage {
    probe: Arc<dyn HealthProbe>,
}

#[async_trait]
impl StateHandler for HealthStage {
    async fn handle(&self, _context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        Ok(StageOutput::Health(self.probe.check().await?))
    }
}

pub struct ClassificationStage {
    classifier: Arc<dyn RiskClassifier>,
}

#[async_trait]
impl StateHandler for ClassificationStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        let classification = self.classifier.classify(context.user_query()).await?;
        Ok(StageOutput::Classification(classification))
    }
}

pub struct ApprovalStage {
    gate: Arc<dyn ApprovalGate>,
}

#[async_trait]
impl StateHandler for ApprovalStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        // A decision submitted by a human is final for this pass.
        if context.user_approval().is_some() {
            return Ok(StageOutput::Approval(None));
        }

        let classification = context
            .risk_classification()
            .ok_or_else(|| HandlerFailure::collaborator("no risk classification recorded"))?;
        let decision = self.gate.decide(classification, context.user_query()).await?;
        Ok(StageOutput::Approval(decision))
    }
}

pub struct ExecutionStage {
    executor: Arc<dyn ActionExecutor>,
}

#[async_trait]
impl StateHandler for ExecutionStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        let approval = context
            .user_approval()
            .ok_or_else(|| HandlerFailure::collaborator("no approval recorded"))?;
        let result = self.executor.execute(context.user_query(), approval).await?;
        Ok(StageOutput::Execution(result))
    }
}

pub struct WitnessStage {
    sink: Arc<dyn TelemetrySink>,
}

#[async_trait]
impl StateHandler for WitnessStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        self.sink.witness(context).await?;
        Ok(StageOutput::Witness)
    }
}

pub struct CheckpointStage {
    store: Arc<dyn CheckpointStore>,
}

#[async_trait]
impl StateHandler for CheckpointStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        let reference = self
            .store
            .save(context.session_id(), LifecycleState::Checkpoint, context)
            .await
            .map_err(|e| HandlerFailure::CheckpointWrite(e.to_string()))?;
        Ok(StageOutput::Checkpoint(reference))
    }
}

pub struct RecoveryStage {
    controller: RecoveryController,
}

#[async_trait]
impl StateHandler for RecoveryStage {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
        let outcome = match self.controller.restore(context.session_id()).await {
            Ok(restoration) => RecoveryOutcome::Restored {
                context: Box::new(restoration.context),
                source: restoration.source,
            },
            Err(e @ RecoveryError::ContextNotFound(_)) => {
                debug!(session_id = %context.session_id(), "Nothing to restore");
                RecoveryOutcome::Failed { reason: e.to_string() }
            }
            Err(e) => RecoveryOutcome::Failed { reason: e.to_string() },
        };
        Ok(StageOutput::Recovery(outcome))
    }
}

/// The full set of collaborators a standard handler registry is built from.
pub struct Collaborators {
    pub validator: Arc<dyn InputValidator>,
    pub probe: Arc<dyn HealthProbe>,
    pub classifier: Arc<dyn RiskClassifier>,
    pub gate: Arc<dyn ApprovalGate>,
    pub executor: Arc<dyn ActionExecutor>,
    pub sink: Arc<dyn TelemetrySink>,
    pub store: Arc<dyn CheckpointStore>,
}

impl Collaborators {
    /// Bind one adapter per state.
    pub fn into_registry(self) -> Result<HandlerRegistry, LifecycleError> {
        HandlerRegistry::builder()
            .bind(LifecycleState::Preflight, Arc::new(PreflightStage { validator: self.validator }))
            .bind(LifecycleState::Health, Arc::new(HealthStage { probe: self.probe }))
            .bind(
                LifecycleState::Classification,
                Arc::new(ClassificationStage { classifier: self.classifier }),
            )
            .bind(LifecycleState::Approval, Arc::new(ApprovalStage { gate: self.gate }))
            .bind(LifecycleState::Execution, Arc::new(ExecutionStage { executor: self.executor }))
            .bind(LifecycleState::Witness, Arc::new(WitnessStage { sink: self.sink }))
            .bind(
                LifecycleState::Checkpoint,
                Arc::new(CheckpointStage { store: self.store.clone() }),
            )
            .bind(
                LifecycleState::Recovery,
                Arc::new(RecoveryStage {
                    controller: RecoveryController::new(self.store),
                }),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{ApprovalDecision, RiskClassification, RiskLevel};
    use crate::domain::lifecycle::SessionId;
    use crate::infrastructure::checkpoint::InMemoryCheckpointStore;
    use crate::infrastructure::collaborators::PolicyApprovalGate;

    #[tokio::test]
    async fn test_approval_stage_defers_to_submitted_decision() {
        let stage = ApprovalStage {
            gate: Arc::new(PolicyApprovalGate::default()),
        };
        let mut ctx = LifecycleContext::new(SessionId::new(), "What is the weather?");
        ctx.risk_classification = Some(RiskClassification::new(RiskLevel::SafeInfo, 0.9, vec![]));

        let fresh = stage.handle(&ctx).await.unwrap();
        assert!(matches!(fresh, StageOutput::Approval(Some(ref d)) if d.approved));

        ctx.user_approval = Some(ApprovalDecision::human(false, "no", None));
        assert_eq!(stage.handle(&ctx).await.unwrap(), StageOutput::Approval(None));
    }

    #[tokio::test]
    async fn test_recovery_stage_reports_missing_checkpoint() {
        let stage = RecoveryStage {
            controller: RecoveryController::new(Arc::new(InMemoryCheckpointStore::new())),
        };
        let ctx = LifecycleContext::new(SessionId::new(), "q");

        match stage.handle(&ctx).await.unwrap() {
            StageOutput::Recovery(RecoveryOutcome::Failed { reason }) => {
                assert!(reason.contains("No checkpoint found"));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checkpoint_stage_saves_snapshot() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let stage = CheckpointStage { store: store.clone() };
        let ctx = LifecycleContext::new(SessionId::new(), "q");

        let output = stage.handle(&ctx).await.unwrap();
        let StageOutput::Checkpoint(reference) = output else {
            panic!("expected checkpoint output");
        };
        assert_eq!(reference.sequence_number, 1);
        assert_eq!(store.list(ctx.session_id()).await.unwrap(), vec![reference]);
    }
}
