use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// A named objective a graph run is executed against.
///
/// Goals are pure data: the executor reads them, evaluates the success
/// criteria after a successful run, and never mutates them. A goal with an
/// empty criteria list is trivially satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier for this goal.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What this goal is about.
    #[serde(default)]
    pub description: String,
    /// Criteria that determine whether the goal was met.
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,
}

/// A single success criterion.
///
/// `metric` selects the evaluation strategy; `target` is interpreted by
/// that strategy (e.g. `"any"` for the `custom` metric, or a
/// `{key, pattern}` object for `contains`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriterion {
    /// Unique identifier within the goal.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Evaluation strategy key.
    pub metric: String,
    /// Strategy-specific target value.
    pub target: serde_json::Value,
}

impl Goal {
    /// Create a goal with no criteria (trivially satisfied).
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            success_criteria: vec![],
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a success criterion.
    pub fn with_criterion(mut self, criterion: SuccessCriterion) -> Self {
        self.success_criteria.push(criterion);
        self
    }

    /// Check structural invariants: non-empty id, unique criterion ids.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TrellisError::Goal("goal id must not be empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.success_criteria {
            if c.id.trim().is_empty() {
                return Err(TrellisError::Goal(format!(
                    "goal '{}' has a criterion with an empty id",
                    self.id
                )));
            }
            if !seen.insert(c.id.as_str()) {
                return Err(TrellisError::Goal(format!(
                    "goal '{}' has duplicate criterion id '{}'",
                    self.id, c.id
                )));
            }
        }
        Ok(())
    }
}

impl SuccessCriterion {
    pub fn new(
        id: impl Into<String>,
        metric: impl Into<String>,
        target: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            metric: metric.into(),
            target,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The observed common case: metric `custom`, target `"any"`.
    pub fn custom_any(id: impl Into<String>) -> Self {
        Self::new(id, "custom", serde_json::Value::String("any".into()))
    }
}

/// Outcome of evaluating a single criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionResult {
    /// Which criterion was evaluated.
    pub criterion_id: String,
    /// Whether this criterion was satisfied.
    pub satisfied: bool,
    /// Explanation of the result.
    pub reasoning: String,
}

/// Aggregate outcome of evaluating a goal's criteria after a run.
///
/// Informational only: an unsatisfied report never flips run success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalReport {
    /// The goal that was evaluated.
    pub goal_id: String,
    /// True when every criterion was satisfied (vacuously true when none).
    pub satisfied: bool,
    /// Per-criterion results, in declaration order.
    pub criteria: Vec<CriterionResult>,
}

impl GoalReport {
    pub fn from_results(goal_id: impl Into<String>, criteria: Vec<CriterionResult>) -> Self {
        let satisfied = criteria.iter().all(|c| c.satisfied);
        Self {
            goal_id: goal_id.into(),
            satisfied,
            criteria,
        }
    }
}
