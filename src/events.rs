//! Progress notifications.
//!
//! Emission is fire-and-forget: a sink must never block the control loop,
//! and a slow or absent consumer simply misses events.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::artifact::ArtifactKind;
use crate::orchestrator::RunOutcome;
use crate::task::{TaskStatus, TaskType};

/// One progress notification, always scoped to a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    TaskStarted {
        session_id: String,
        task_id: String,
        task_type: TaskType,
        attempt: u32,
    },
    TaskUpdated {
        session_id: String,
        task_id: String,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ArtifactProduced {
        session_id: String,
        artifact_id: String,
        kind: ArtifactKind,
        version: u32,
    },
    /// A single page of the render task finished
    PageProgress {
        session_id: String,
        task_id: String,
        completed: usize,
        total: usize,
    },
    RunCompleted {
        session_id: String,
        outcome: RunOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ProgressEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::TaskStarted { session_id, .. }
            | Self::TaskUpdated { session_id, .. }
            | Self::ArtifactProduced { session_id, .. }
            | Self::PageProgress { session_id, .. }
            | Self::RunCompleted { session_id, .. } => session_id,
        }
    }
}

pub trait EventSink: Send + Sync {
    /// Deliver an event without waiting on the consumer.
    fn emit(&self, event: ProgressEvent);
}

/// Fans events out to any number of subscribers via a bounded broadcast
/// channel. Lagging subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: ProgressEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(task_id: &str) -> ProgressEvent {
        ProgressEvent::TaskStarted {
            session_id: "s1".to_string(),
            task_id: task_id.to_string(),
            task_type: TaskType::Analyze,
            attempt: 1,
        }
    }

    #[test]
    fn test_emit_without_subscribers_does_not_fail() {
        let sink = BroadcastEventSink::new(4);
        sink.emit(started("a"));
        NoopEventSink.emit(started("a"));
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();
        sink.emit(started("a"));
        sink.emit(started("b"));

        assert_eq!(rx.recv().await.unwrap(), started("a"));
        assert_eq!(rx.recv().await.unwrap(), started("b"));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(started("a")).unwrap();
        assert_eq!(json["event"], "task_started");
        assert_eq!(json["task_type"], "analyze");
        assert_eq!(started("a").session_id(), "s1");
    }
}
