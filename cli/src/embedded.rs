// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded governance runtime
//!
//! Builds the checkpoint store, event bus, reference collaborators and the
//! lifecycle service in-process from a `GovernanceConfig`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use aegis_governance::{
    application::LifecycleService,
    domain::{checkpoint::CheckpointStore, context::HealthStatus},
    infrastructure::{
        checkpoint::{InMemoryCheckpointStore, LocalCheckpointStore},
        collaborators::{
            DryRunExecutor, KeywordRiskClassifier, PolicyApprovalGate, StaticHealthProbe,
            StructuralInputValidator,
        },
        event_bus::EventBus,
        handlers::Collaborators,
    },
};

use crate::config::{CheckpointBackend, GovernanceConfig};

pub struct GovernanceRuntime {
    service: Arc<LifecycleService>,
    store: Arc<dyn CheckpointStore>,
    event_bus: EventBus,
}

impl GovernanceRuntime {
    /// Wire a runtime from configuration. `health_override` replaces the
    /// configured static health status for this process.
    pub fn new(config: &GovernanceConfig, health_override: Option<HealthStatus>) -> Result<Self> {
        config
            .validate()
            .context("Configuration validation failed")?;

        let store = open_store(config)?;
        let event_bus = EventBus::new(config.spec.telemetry.channel_capacity);
        let health = health_override.unwrap_or(config.spec.health.default_status);

        let registry = Collaborators {
            validator: Arc::new(StructuralInputValidator::default()),
            probe: Arc::new(StaticHealthProbe::new(health)),
            classifier: Arc::new(KeywordRiskClassifier::new()),
            gate: Arc::new(PolicyApprovalGate::new(
                config.spec.approval.auto_approve_max_level,
                config.spec.approval.auto_reject_min_level,
            )),
            executor: Arc::new(DryRunExecutor::new()),
            sink: Arc::new(event_bus.clone()),
            store: store.clone(),
        }
        .into_registry()
        .context("Failed to bind lifecycle handlers")?;

        info!(
            config = %config.metadata.name,
            backend = ?config.spec.checkpoint.backend,
            health = %health,
            "Governance runtime initialized"
        );

        Ok(Self {
            service: Arc::new(LifecycleService::new(registry)),
            store,
            event_bus,
        })
    }

    pub fn service(&self) -> Arc<LifecycleService> {
        self.service.clone()
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        self.store.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

/// Open the configured checkpoint backend.
pub fn open_store(config: &GovernanceConfig) -> Result<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = match config.spec.checkpoint.backend {
        CheckpointBackend::Local => {
            let path = config.spec.checkpoint.resolved_path();
            Arc::new(
                LocalCheckpointStore::new(&path)
                    .with_context(|| format!("Failed to open checkpoint store at {:?}", path))?,
            )
        }
        CheckpointBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_governance::domain::lifecycle::{FinalStatus, LifecycleState};

    fn memory_config() -> GovernanceConfig {
        let mut config = GovernanceConfig::default();
        config.spec.checkpoint.backend = CheckpointBackend::Memory;
        config
    }

    #[tokio::test]
    async fn test_runtime_completes_safe_query() {
        let runtime = GovernanceRuntime::new(&memory_config(), None).unwrap();
        let service = runtime.service();
        let mut witness = runtime.event_bus().subscribe();

        let id = service.start("What is the weather?").await.unwrap();
        assert_eq!(service.run_until_blocked(id).await.unwrap(), LifecycleState::Final);

        let ctx = service.context(id).await.unwrap();
        assert_eq!(ctx.final_status(), Some(FinalStatus::Completed));
        assert_eq!(witness.try_recv().unwrap().session_id, id);
        assert_eq!(runtime.store().list(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_override_forces_recovery() {
        let runtime = GovernanceRuntime::new(&memory_config(), Some(HealthStatus::Critical)).unwrap();
        let service = runtime.service();

        let id = service.start("What is the weather?").await.unwrap();
        service.run_until_blocked(id).await.ok();

        let ctx = service.context(id).await.unwrap();
        assert_eq!(ctx.final_status(), Some(FinalStatus::Aborted));
        assert!(ctx.is_fatal());
    }

    #[test]
    fn test_local_backend_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GovernanceConfig::default();
        config.spec.checkpoint.path = dir.path().join("checkpoints");

        GovernanceRuntime::new(&config, None).unwrap();
        assert!(dir.path().join("checkpoints").is_dir());
    }
}
