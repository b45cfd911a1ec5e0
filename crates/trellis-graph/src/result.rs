use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use trellis_core::error::TrellisError;
use trellis_core::goal::GoalReport;
use trellis_core::types::RunId;

/// Outcome of executing a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    /// Which node was executed.
    pub node_id: String,
    /// Whether the handler succeeded.
    pub succeeded: bool,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
    /// Captured error detail on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Classification of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnregisteredFunction,
    MissingInput,
    DeadEnd,
    CycleDetected,
    Cancelled,
    HandlerFailure,
}

/// Error detail carried by a failed execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    /// The offending node, where one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id,
        }
    }

    /// Classify a fatal run error.
    pub fn from_error(err: &TrellisError) -> Self {
        let (kind, node_id) = match err {
            TrellisError::UnregisteredFunction { node, .. } => {
                (ErrorKind::UnregisteredFunction, Some(node.clone()))
            }
            TrellisError::MissingInput { node, .. } => (ErrorKind::MissingInput, Some(node.clone())),
            TrellisError::DeadEnd { node } => (ErrorKind::DeadEnd, Some(node.clone())),
            TrellisError::CycleDetected { .. } => (ErrorKind::CycleDetected, None),
            TrellisError::Cancelled => (ErrorKind::Cancelled, None),
            TrellisError::HandlerFailure { node, .. } | TrellisError::HandlerTimeout { node, .. } => {
                (ErrorKind::HandlerFailure, Some(node.clone()))
            }
            _ => (ErrorKind::HandlerFailure, None),
        };
        Self::new(kind, err.to_string(), node_id)
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The outcome record of one graph execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unique id of this run.
    pub run_id: RunId,
    /// Whether a terminal node was reached with a success outcome.
    pub success: bool,
    /// Final execution state (empty when the run was cancelled).
    pub output: HashMap<String, serde_json::Value>,
    /// Failure detail when not successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Per-node outcomes in execution order.
    pub node_outcomes: Vec<NodeOutcome>,
    /// Goal criteria evaluation, present after a successful run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_report: Option<GoalReport>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}
