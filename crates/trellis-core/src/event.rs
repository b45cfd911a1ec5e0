use crate::types::RunId;

/// Execution event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum ExecEvent {
    /// An execution moved from pending to running.
    RunStarted { run_id: RunId, graph_id: String },
    /// A node's handler is about to be invoked.
    NodeStarted { run_id: RunId, node_id: String },
    /// A node's handler returned (either way).
    NodeCompleted {
        run_id: RunId,
        node_id: String,
        succeeded: bool,
        elapsed_ms: u64,
        error: Option<String>,
    },
    /// The run reached a terminal state.
    RunCompleted {
        run_id: RunId,
        success: bool,
        total_elapsed_ms: u64,
    },
    /// The run failed with a fatal error.
    RunFailed { run_id: RunId, error: String },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<ExecEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: ExecEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
