// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Witness Records
//
// In-memory fan-out of WITNESS acknowledgements using a tokio broadcast
// channel. Serves as the telemetry sink for the WITNESS stage and lets the
// CLI or any observer stream a session's audit trail as it is produced.
//
// In-memory only: records are lost on restart. Durable audit lives in the
// checkpoint snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::collaborators::TelemetrySink;
use crate::domain::context::{LifecycleContext, RiskLevel};
use crate::domain::errors::HandlerFailure;
use crate::domain::events::TelemetryEvent;
use crate::domain::lifecycle::SessionId;

/// Snapshot of the audit trail handed to the sink at WITNESS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessRecord {
    pub session_id: SessionId,
    pub user_query: String,
    pub risk_level: Option<RiskLevel>,
    pub approved: Option<bool>,
    pub execution_success: Option<bool>,
    pub events: Vec<TelemetryEvent>,
    pub witnessed_at: DateTime<Utc>,
}

impl WitnessRecord {
    pub fn from_context(context: &LifecycleContext) -> Self {
        Self {
            session_id: context.session_id(),
            user_query: context.user_query().to_string(),
            risk_level: context.risk_classification().map(|c| c.level),
            approved: context.user_approval().map(|a| a.approved),
            execution_success: context.execution_result().map(|r| r.success),
            events: context.telemetry_events().to_vec(),
            witnessed_at: Utc::now(),
        }
    }
}

/// Event bus for publishing and subscribing to witness records
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<WitnessRecord>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many records can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, record: WitnessRecord) {
        debug!(session_id = %record.session_id, events = record.events.len(), "Publishing witness record");

        let receiver_count = self.sender.send(record).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to witness records");
        }
    }

    /// Subscribe to all witness records
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            session_id: None,
        }
    }

    /// Subscribe and filter for one session
    pub fn subscribe_session(&self, session_id: SessionId) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            session_id: Some(session_id),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl TelemetrySink for EventBus {
    async fn witness(&self, context: &LifecycleContext) -> Result<(), HandlerFailure> {
        self.publish(WitnessRecord::from_context(context));
        Ok(())
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<WitnessRecord>,
    session_id: Option<SessionId>,
}

impl EventReceiver {
    /// Receive the next record (waits until one is available)
    pub async fn recv(&mut self) -> Result<WitnessRecord, EventBusError> {
        loop {
            let record = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} records", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if self.matches(&record) {
                return Ok(record);
            }
        }
    }

    /// Try to receive a record without blocking
    pub fn try_recv(&mut self) -> Result<WitnessRecord, EventBusError> {
        loop {
            let record = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} records", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if self.matches(&record) {
                return Ok(record);
            }
        }
    }

    fn matches(&self, record: &WitnessRecord) -> bool {
        self.session_id.map_or(true, |id| id == record.session_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No records available")]
    Empty,

    #[error("Receiver lagged by {0} records (records were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_witness_publishes_record() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let ctx = LifecycleContext::new(SessionId::new(), "What is the weather?");

        bus.witness(&ctx).await.unwrap();

        let record = receiver.recv().await.unwrap();
        assert_eq!(record.session_id, ctx.session_id());
        assert_eq!(record.user_query, "What is the weather?");
        assert!(record.execution_success.is_none());
    }

    #[tokio::test]
    async fn test_session_filtering() {
        let bus = EventBus::new(10);
        let ours = SessionId::new();
        let mut receiver = bus.subscribe_session(ours);

        bus.witness(&LifecycleContext::new(SessionId::new(), "other")).await.unwrap();
        bus.witness(&LifecycleContext::new(ours, "ours")).await.unwrap();

        let record = receiver.recv().await.unwrap();
        assert_eq!(record.user_query, "ours");
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(WitnessRecord::from_context(&LifecycleContext::new(SessionId::new(), "q")));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
