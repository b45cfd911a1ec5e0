use serde::{Deserialize, Serialize};

use crate::state::ExecutionState;

/// A directed, conditionally-traversed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Unique identifier within the graph.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Condition that must hold to traverse this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Traverse regardless of the source node's outcome.
    #[default]
    Always,
    /// Traverse only if the source node succeeded.
    OnSuccess,
    /// Traverse only if the source node failed.
    OnFailure,
    /// Traverse if a simple expression over execution state matches.
    /// Supported: `key == "value"`, `key != "value"`, `key contains "substr"`.
    When { expr: String },
}

impl EdgeSpec {
    /// Create an unconditional edge.
    pub fn always(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge that fires on success.
    pub fn on_success(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: EdgeCondition::OnSuccess,
        }
    }

    /// Create an edge that fires on failure.
    pub fn on_failure(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: EdgeCondition::OnFailure,
        }
    }

    /// Create an edge guarded by a state expression.
    pub fn when(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: EdgeCondition::When { expr: expr.into() },
        }
    }
}

impl EdgeCondition {
    /// Whether this condition matches the source node's outcome and state.
    pub fn matches(&self, node_succeeded: bool, state: &ExecutionState) -> bool {
        match self {
            EdgeCondition::Always => true,
            EdgeCondition::OnSuccess => node_succeeded,
            EdgeCondition::OnFailure => !node_succeeded,
            EdgeCondition::When { expr } => evaluate_expr(expr, state),
        }
    }
}

/// Evaluate a simple expression against execution state.
///
/// Supported expressions:
/// - `key == "value"` — exact match
/// - `key != "value"` — not equal
/// - `key contains "substr"` — substring match
///
/// Returns `false` for unparseable expressions.
pub fn evaluate_expr(expr: &str, state: &ExecutionState) -> bool {
    let expr = expr.trim();

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, "contains") {
        return state.get_str(key).is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return state.get_str(key).is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return state.get_str(key).is_some_and(|s| s == value);
    }

    false
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let parts: Vec<&str> = expr.splitn(2, op).collect();
    if parts.len() != 2 {
        return None;
    }
    let key = parts[0].trim();
    let val = parts[1].trim().trim_matches('"');
    Some((key, val))
}
