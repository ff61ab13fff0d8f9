//! Domain event system — lets presentation layers observe the turn loop.
//!
//! The engine publishes events as a turn progresses. What (if anything) gets
//! echoed to the operator is decided by subscribers, not by the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model answered one round
    ModelResponded {
        conversation_id: String,
        round: u32,
        model: String,
        tool_calls: usize,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched to the tool server
    ToolDispatched {
        call_id: String,
        tool_name: String,
        arguments: String,
        success: bool,
        output_preview: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn produced its final answer
    TurnCompleted {
        conversation_id: String,
        rounds: u32,
        tool_dispatches: usize,
        timestamp: DateTime<Utc>,
    },

    /// A turn was aborted by a fatal error
    TurnFailed {
        conversation_id: String,
        round: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
