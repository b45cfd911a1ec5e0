use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Run failures (surfaced in ExecutionResult.error, never retried here)
    #[error("No function registered for node '{node}' (function '{function}')")]
    UnregisteredFunction { node: String, function: String },

    #[error("Node '{node}' requires input key '{key}' which is absent from execution state")]
    MissingInput { node: String, key: String },

    #[error("Node '{node}' has no outgoing edge matching its outcome and is not terminal")]
    DeadEnd { node: String },

    #[error("Execution exceeded {limit} node visits, aborting (cyclic graph?)")]
    CycleDetected { limit: usize },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Node '{node}' failed: {message}")]
    HandlerFailure { node: String, message: String },

    #[error("Handler for node '{node}' timed out after {timeout_secs}s")]
    HandlerTimeout { node: String, timeout_secs: u64 },

    // Validation errors (returned as Err from execute, caller mistakes)
    #[error("Invalid graph: {0}")]
    Graph(String),

    #[error("Invalid goal: {0}")]
    Goal(String),

    // Ambient errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Tool server error: {server}: {message}")]
    ToolServer { server: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
