// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Uniform stage adapter contract.
//!
//! Each non-final state is bound to exactly one `StateHandler` at
//! construction. A handler reads the context and returns a typed
//! `StageOutput`; it never writes the context itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::context::{
    ApprovalDecision, CheckpointRef, ExecutionResult, HealthReport, LifecycleContext,
    RiskClassification,
};
use crate::domain::errors::{HandlerFailure, LifecycleError};
use crate::domain::lifecycle::LifecycleState;

/// Result of the RECOVERY stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    Restored {
        context: Box<LifecycleContext>,
        source: CheckpointRef,
    },
    Failed {
        reason: String,
    },
}

/// Partial update produced by one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Preflight,
    Health(HealthReport),
    Classification(RiskClassification),
    /// `None` while the gate is still waiting for a decision
    Approval(Option<ApprovalDecision>),
    Execution(ExecutionResult),
    Witness,
    Checkpoint(CheckpointRef),
    Recovery(RecoveryOutcome),
}

impl StageOutput {
    /// The only state allowed to produce this output.
    pub fn state(&self) -> LifecycleState {
        match self {
            StageOutput::Preflight => LifecycleState::Preflight,
            StageOutput::Health(_) => LifecycleState::Health,
            StageOutput::Classification(_) => LifecycleState::Classification,
            StageOutput::Approval(_) => LifecycleState::Approval,
            StageOutput::Execution(_) => LifecycleState::Execution,
            StageOutput::Witness => LifecycleState::Witness,
            StageOutput::Checkpoint(_) => LifecycleState::Checkpoint,
            StageOutput::Recovery(_) => LifecycleState::Recovery,
        }
    }
}

#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn handle(&self, context: &LifecycleContext) -> Result<StageOutput, HandlerFailure>;
}

/// Fixed mapping from state tag to handler.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<LifecycleState, Arc<dyn StateHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    pub fn get(&self, state: LifecycleState) -> Option<&Arc<dyn StateHandler>> {
        self.handlers.get(&state)
    }
}

pub struct HandlerRegistryBuilder {
    handlers: HashMap<LifecycleState, Arc<dyn StateHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn bind(mut self, state: LifecycleState, handler: Arc<dyn StateHandler>) -> Self {
        self.handlers.insert(state, handler);
        self
    }

    /// Fails with `MissingHandler` unless every non-final state is bound.
    pub fn build(self) -> Result<HandlerRegistry, LifecycleError> {
        if let Some(missing) = LifecycleState::ALL
            .into_iter()
            .filter(|state| state.has_handler())
            .find(|state| !self.handlers.contains_key(state))
        {
            return Err(LifecycleError::MissingHandler(missing));
        }

        Ok(HandlerRegistry {
            handlers: self.handlers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl StateHandler for Noop {
        async fn handle(&self, _context: &LifecycleContext) -> Result<StageOutput, HandlerFailure> {
            Ok(StageOutput::Witness)
        }
    }

    #[test]
    fn test_registry_requires_every_stage() {
        let handler: Arc<dyn StateHandler> = Arc::new(Noop);
        let partial = HandlerRegistry::builder()
            .bind(LifecycleState::Preflight, handler.clone())
            .bind(LifecycleState::Health, handler.clone())
            .build();
        assert!(matches!(
            partial,
            Err(LifecycleError::MissingHandler(LifecycleState::Classification))
        ));

        let full = LifecycleState::ALL
            .into_iter()
            .filter(|s| s.has_handler())
            .fold(HandlerRegistry::builder(), |b, s| b.bind(s, handler.clone()))
            .build()
            .unwrap();
        assert!(full.get(LifecycleState::Recovery).is_some());
        assert!(full.get(LifecycleState::Final).is_none());
    }

    #[test]
    fn test_output_state_binding() {
        assert_eq!(StageOutput::Approval(None).state(), LifecycleState::Approval);
        assert_eq!(StageOutput::Witness.state(), LifecycleState::Witness);
    }
}
