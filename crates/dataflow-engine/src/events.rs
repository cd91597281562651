//! Event types for streaming run progress
//!
//! Events are sent from the engine to the editor (or any consumer) to
//! report node progress, failures and how a run ended.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Trait for sending dataflow events
///
/// This abstracts over the transport mechanism (UI channel, mpsc, etc.)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: DataflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The receiving side is gone
    #[error("event channel closed")]
    ChannelClosed,
}

/// Events emitted during a graph run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataflowEvent {
    /// A run started
    #[serde(rename_all = "camelCase")]
    RunStarted {
        graph_id: String,
        run_id: String,
        nodes: Vec<String>,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted { node_id: String, run_id: String },

    /// A node completed successfully
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        run_id: String,
        execution_time_ms: u64,
    },

    /// A node failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        run_id: String,
        error: String,
    },

    /// A node was not invoked (pinned output or cycle member)
    #[serde(rename_all = "camelCase")]
    NodeSkipped {
        node_id: String,
        run_id: String,
        reason: String,
    },

    /// A run finished every scheduled node
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        graph_id: String,
        run_id: String,
        succeeded: usize,
        failed: usize,
    },

    /// A run stopped early because the graph changed or it was cancelled
    #[serde(rename_all = "camelCase")]
    RunAbandoned {
        graph_id: String,
        run_id: String,
        reason: String,
    },
}

impl DataflowEvent {
    /// Node id for node-level events
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeSkipped { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: DataflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<DataflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<DataflowEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: DataflowEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}

/// Forwards events to a tokio channel, e.g. the task feeding an editor UI
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<DataflowEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver its events arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DataflowEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: DataflowEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::ChannelClosed)
    }
}
