// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle Service - multi-session driver
//!
//! Keeps one `LifecycleManager` per live session. Calls for the same session
//! are serialised by that session's mutex; independent sessions proceed
//! concurrently and only share the checkpoint store behind their handlers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::application::lifecycle_manager::{LifecycleManager, SharedLifecycleManager};
use crate::domain::context::{ApprovalDecision, LifecycleContext};
use crate::domain::errors::LifecycleError;
use crate::domain::handler::HandlerRegistry;
use crate::domain::lifecycle::{LifecycleState, SessionId, TransitionRecord};

pub struct LifecycleService {
    handlers: HandlerRegistry,
    sessions: Arc<RwLock<HashMap<SessionId, SharedLifecycleManager>>>,
}

impl LifecycleService {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self {
            handlers,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a session with a generated id.
    pub async fn start(&self, user_query: impl Into<String>) -> Result<SessionId, LifecycleError> {
        self.start_session(SessionId::new(), user_query).await
    }

    /// Start a session under a caller-chosen id. Fails if that id is still live.
    pub async fn start_session(
        &self,
        session_id: SessionId,
        user_query: impl Into<String>,
    ) -> Result<SessionId, LifecycleError> {
        let manager = LifecycleManager::start_session(self.handlers.clone(), session_id, user_query)?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(LifecycleError::SessionAlreadyActive(session_id));
        }
        sessions.insert(session_id, Arc::new(Mutex::new(manager)));

        debug!(session_id = %session_id, live_sessions = sessions.len(), "Session registered");
        Ok(session_id)
    }

    async fn session(&self, session_id: SessionId) -> Result<SharedLifecycleManager, LifecycleError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or(LifecycleError::SessionNotFound(session_id))
    }

    pub async fn advance(&self, session_id: SessionId) -> Result<bool, LifecycleError> {
        let manager = self.session(session_id).await?;
        let mut manager = manager.lock().await;
        manager.advance().await
    }

    /// Advance until the session waits for input or reaches FINAL.
    pub async fn run_until_blocked(&self, session_id: SessionId) -> Result<LifecycleState, LifecycleError> {
        let manager = self.session(session_id).await?;
        let mut manager = manager.lock().await;
        while manager.current_state() != LifecycleState::Final && manager.advance().await? {}
        Ok(manager.current_state())
    }

    pub async fn submit_approval(
        &self,
        session_id: SessionId,
        decision: ApprovalDecision,
    ) -> Result<(), LifecycleError> {
        let manager = self.session(session_id).await?;
        let mut manager = manager.lock().await;
        manager.submit_approval(decision)
    }

    pub async fn trigger_recovery(
        &self,
        session_id: SessionId,
        reason: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        let manager = self.session(session_id).await?;
        let mut manager = manager.lock().await;
        manager.trigger_recovery(reason)
    }

    pub async fn reset(&self, session_id: SessionId) -> Result<(), LifecycleError> {
        let manager = self.session(session_id).await?;
        let mut manager = manager.lock().await;
        manager.reset()
    }

    pub async fn begin_pass(
        &self,
        session_id: SessionId,
        user_query: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        let manager = self.session(session_id).await?;
        let mut manager = manager.lock().await;
        manager.begin_pass(user_query)
    }

    pub async fn current_state(&self, session_id: SessionId) -> Result<LifecycleState, LifecycleError> {
        let manager = self.session(session_id).await?;
        let manager = manager.lock().await;
        Ok(manager.current_state())
    }

    pub async fn context(&self, session_id: SessionId) -> Result<LifecycleContext, LifecycleError> {
        let manager = self.session(session_id).await?;
        let manager = manager.lock().await;
        Ok(manager.context().clone())
    }

    pub async fn history(&self, session_id: SessionId) -> Result<Vec<TransitionRecord>, LifecycleError> {
        let manager = self.session(session_id).await?;
        let manager = manager.lock().await;
        Ok(manager.history().to_vec())
    }

    /// Remove a finished session and hand back its final context.
    pub async fn archive(&self, session_id: SessionId) -> Result<LifecycleContext, LifecycleError> {
        let manager = self.session(session_id).await?;
        let manager = manager.lock().await;
        if manager.current_state() != LifecycleState::Final {
            return Err(LifecycleError::SessionNotFinal {
                session_id,
                state: manager.current_state(),
            });
        }

        self.sessions.write().await.remove(&session_id);
        info!(
            session_id = %session_id,
            final_status = ?manager.context().final_status(),
            "Session archived"
        );
        Ok(manager.context().clone())
    }

    pub async fn active_sessions(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::HealthStatus;
    use crate::domain::lifecycle::FinalStatus;
    use crate::infrastructure::checkpoint::InMemoryCheckpointStore;
    use crate::infrastructure::collaborators::{
        DryRunExecutor, KeywordRiskClassifier, PolicyApprovalGate, StaticHealthProbe,
        StructuralInputValidator,
    };
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::handlers::Collaborators;

    fn service() -> LifecycleService {
        let registry = Collaborators {
            validator: Arc::new(StructuralInputValidator::default()),
            probe: Arc::new(StaticHealthProbe::new(HealthStatus::Healthy)),
            classifier: Arc::new(KeywordRiskClassifier::new()),
            gate: Arc::new(PolicyApprovalGate::default()),
            executor: Arc::new(DryRunExecutor::new()),
            sink: Arc::new(EventBus::new(16)),
            store: Arc::new(InMemoryCheckpointStore::new()),
        }
        .into_registry()
        .unwrap();
        LifecycleService::new(registry)
    }

    #[tokio::test]
    async fn test_run_and_archive() {
        let service = service();
        let id = service.start("What is the weather?").await.unwrap();

        assert_eq!(service.run_until_blocked(id).await.unwrap(), LifecycleState::Final);
        let ctx = service.archive(id).await.unwrap();
        assert_eq!(ctx.final_status(), Some(FinalStatus::Completed));
        assert!(service.active_sessions().await.is_empty());
        assert!(matches!(
            service.advance(id).await,
            Err(LifecycleError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_live_session_is_rejected() {
        let service = service();
        let id = service.start("What is the weather?").await.unwrap();
        assert!(matches!(
            service.start_session(id, "again").await,
            Err(LifecycleError::SessionAlreadyActive(_))
        ));
    }

    #[tokio::test]
    async fn test_archive_requires_final() {
        let service = service();
        let id = service.start("set log_level=debug").await.unwrap();
        assert_eq!(service.run_until_blocked(id).await.unwrap(), LifecycleState::Approval);
        assert!(matches!(
            service.archive(id).await,
            Err(LifecycleError::SessionNotFinal { state: LifecycleState::Approval, .. })
        ));
    }
}
