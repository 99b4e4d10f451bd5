//! Audit events emitted after each committed operation.
//!
//! The [`AuditEmitter`] fans an [`AuditEvent`] out to every registered
//! [`AuditSink`]. Emission is best-effort: a failing or stalled sink is
//! logged and the operation that produced the event still succeeds.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AuditError;
use crate::state_machine::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Sign,
    Complete,
    Cancel,
    Assign,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Sign => "SIGN",
            AuditAction::Complete => "COMPLETE",
            AuditAction::Cancel => "CANCEL",
            AuditAction::Assign => "ASSIGN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    MaintenanceRecord,
    ChecklistResponse,
    Signature,
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub at: DateTime<Utc>,
    pub actor: Actor,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub label: String,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        label: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            at: Utc::now(),
            actor: actor.clone(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            label: label.into(),
            details,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    async fn emit(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn emit(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let details = serde_json::to_string(&event.details)?;
        info!(
            target: "maintflow::audit",
            action = %event.action,
            actor = %event.actor.id,
            entity = ?event.entity_type,
            entity_id = %event.entity_id,
            label = %event.label,
            %details,
            "audit"
        );
        Ok(())
    }
}

/// Publishes events on a broadcast channel for in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastAuditSink {
    sender: broadcast::Sender<AuditEvent>,
}

impl BroadcastAuditSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl AuditSink for BroadcastAuditSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn emit(&self, event: &AuditEvent) -> Result<(), AuditError> {
        // No subscribers is not a failure.
        if self.sender.send(event.clone()).is_err() {
            debug!(event = %event.id, "no audit subscribers");
        }
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn actions(&self) -> Vec<AuditAction> {
        self.events.lock().await.iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn emit(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Default upper bound on a single sink delivery.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct AuditEmitter {
    sinks: Vec<Arc<dyn AuditSink>>,
    emit_timeout: Duration,
}

impl Default for AuditEmitter {
    fn default() -> Self {
        Self {
            sinks: Vec::new(),
            emit_timeout: DEFAULT_EMIT_TIMEOUT,
        }
    }
}

impl AuditEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_timeout(mut self, emit_timeout: Duration) -> Self {
        self.emit_timeout = emit_timeout;
        self
    }

    /// Deliver `event` to every sink. Never fails; a sink that does not
    /// answer within the emit timeout is skipped.
    pub async fn emit(&self, event: AuditEvent) {
        for sink in &self.sinks {
            match tokio::time::timeout(self.emit_timeout, sink.emit(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    sink = sink.name(),
                    event = %event.id,
                    action = %event.action,
                    error = %e,
                    "audit emission failed"
                ),
                Err(_) => warn!(
                    sink = sink.name(),
                    event = %event.id,
                    action = %event.action,
                    timeout_ms = self.emit_timeout.as_millis() as u64,
                    "audit emission timed out"
                ),
            }
        }
    }
}

impl fmt::Debug for AuditEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("AuditEmitter")
            .field("sinks", &names)
            .field("emit_timeout", &self.emit_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn emit(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Rejected {
                sink: "failing".into(),
                message: "disk full".into(),
            })
        }
    }

    struct StalledSink;

    #[async_trait]
    impl AuditSink for StalledSink {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn emit(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            std::future::pending().await
        }
    }

    fn event(action: AuditAction) -> AuditEvent {
        AuditEvent::new(
            &Actor::new("u-1", "Ana"),
            action,
            EntityType::MaintenanceRecord,
            "r-1",
            "Preventive maintenance due 2026-10-20",
            json!({ "status": "IN_PROGRESS" }),
        )
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_the_others() {
        let memory = Arc::new(MemoryAuditSink::new());
        let emitter = AuditEmitter::new()
            .with_sink(Arc::new(FailingSink))
            .with_sink(memory.clone());

        emitter.emit(event(AuditAction::Update)).await;
        assert_eq!(memory.actions().await, vec![AuditAction::Update]);
    }

    #[tokio::test]
    async fn stalled_sink_is_skipped_after_timeout() {
        let memory = Arc::new(MemoryAuditSink::new());
        let emitter = AuditEmitter::new()
            .with_timeout(Duration::from_millis(20))
            .with_sink(Arc::new(StalledSink))
            .with_sink(memory.clone());

        emitter.emit(event(AuditAction::Cancel)).await;
        assert_eq!(memory.actions().await, vec![AuditAction::Cancel]);
    }

    #[tokio::test]
    async fn broadcast_subscribers_receive_events() {
        let sink = BroadcastAuditSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(&event(AuditAction::Sign)).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.action, AuditAction::Sign);
        assert_eq!(received.entity_id, "r-1");
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_ok() {
        let sink = BroadcastAuditSink::new(1);
        assert!(sink.emit(&event(AuditAction::Create)).await.is_ok());
    }

    #[test]
    fn event_serializes_action_in_upper_case() {
        let json = serde_json::to_value(event(AuditAction::Complete)).unwrap();
        assert_eq!(json["action"], "COMPLETE");
        assert_eq!(json["entity_type"], "MaintenanceRecord");
        assert_eq!(json["details"]["status"], "IN_PROGRESS");
    }
}
