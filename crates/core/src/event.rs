//! Domain event system — decoupled observation of the turn loop.
//!
//! Events are published when something interesting happens in a session.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model produced a turn
    ResponseReceived {
        model: String,
        tokens_used: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched
    ToolDispatched {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A failing command is being retried automatically
    RecoveryAttempt {
        tool_name: String,
        command: String,
        attempt: u32,
        ceiling: u32,
        timestamp: DateTime<Utc>,
    },

    /// A failing command hit the retry ceiling
    RecoveryExhausted {
        command: String,
        ceiling: u32,
        timestamp: DateTime<Utc>,
    },

    /// The active project root moved
    ProjectRootChanged {
        path: String,
        revision: u64,
        timestamp: DateTime<Utc>,
    },

    /// A user turn was cut off by the round cap
    RoundLimitReached {
        rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A turn was aborted by an unrecoverable error
    ErrorOccurred {
        context: String,
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
