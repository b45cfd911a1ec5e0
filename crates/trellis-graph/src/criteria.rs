use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::goal::{CriterionResult, Goal, GoalReport, SuccessCriterion};

use crate::state::ExecutionState;

/// Evaluation strategy for one metric kind.
///
/// Evaluators are deterministic reads over the final execution state; they
/// never mutate it and never fail the run. An unsatisfied criterion is
/// informational.
pub trait CriterionEvaluator: Send + Sync + 'static {
    /// The metric key this evaluator handles.
    fn metric(&self) -> &str;

    /// Evaluate one criterion against the final state.
    fn evaluate(
        &self,
        criterion: &SuccessCriterion,
        state: &ExecutionState,
        run_succeeded: bool,
    ) -> CriterionResult;
}

/// Metric-keyed registry of criterion evaluators.
///
/// Registering an evaluator under an existing metric overwrites it.
/// Unknown metrics evaluate to unsatisfied with an explanatory reason.
pub struct CriteriaEvaluators {
    evaluators: HashMap<String, Arc<dyn CriterionEvaluator>>,
}

impl CriteriaEvaluators {
    pub fn new() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Registry with the built-in metric kinds.
    pub fn with_builtins() -> Self {
        let mut evaluators = Self::new();
        evaluators.register(CustomEvaluator);
        evaluators.register(KeyPresentEvaluator);
        evaluators.register(ContainsEvaluator);
        evaluators.register(EqualsEvaluator);
        evaluators
    }

    /// Register an evaluator (overwrites any prior one for the metric).
    pub fn register(&mut self, evaluator: impl CriterionEvaluator) {
        self.evaluators
            .insert(evaluator.metric().to_string(), Arc::new(evaluator));
    }

    /// Evaluate every criterion of a goal into a report.
    pub fn evaluate_goal(
        &self,
        goal: &Goal,
        state: &ExecutionState,
        run_succeeded: bool,
    ) -> GoalReport {
        let criteria = goal
            .success_criteria
            .iter()
            .map(|c| match self.evaluators.get(&c.metric) {
                Some(evaluator) => evaluator.evaluate(c, state, run_succeeded),
                None => CriterionResult {
                    criterion_id: c.id.clone(),
                    satisfied: false,
                    reasoning: format!("no evaluator registered for metric '{}'", c.metric),
                },
            })
            .collect();
        GoalReport::from_results(goal.id.clone(), criteria)
    }
}

impl Default for CriteriaEvaluators {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// `custom`: target `"any"` is satisfied once the run succeeded.
/// Other targets are delegated to nothing and stay unsatisfied.
struct CustomEvaluator;

impl CriterionEvaluator for CustomEvaluator {
    fn metric(&self) -> &str {
        "custom"
    }

    fn evaluate(
        &self,
        criterion: &SuccessCriterion,
        _state: &ExecutionState,
        run_succeeded: bool,
    ) -> CriterionResult {
        let is_any = criterion.target.as_str() == Some("any");
        let (satisfied, reasoning) = if !is_any {
            (
                false,
                format!("unsupported custom target: {}", criterion.target),
            )
        } else if run_succeeded {
            (true, "run completed successfully".to_string())
        } else {
            (false, "run did not complete successfully".to_string())
        };
        CriterionResult {
            criterion_id: criterion.id.clone(),
            satisfied,
            reasoning,
        }
    }
}

/// `key_present`: the target names a key that must exist in final state.
struct KeyPresentEvaluator;

impl CriterionEvaluator for KeyPresentEvaluator {
    fn metric(&self) -> &str {
        "key_present"
    }

    fn evaluate(
        &self,
        criterion: &SuccessCriterion,
        state: &ExecutionState,
        _run_succeeded: bool,
    ) -> CriterionResult {
        let (satisfied, reasoning) = match criterion.target.as_str() {
            Some(key) if state.contains_key(key) => {
                (true, format!("state contains key '{}'", key))
            }
            Some(key) => (false, format!("state is missing key '{}'", key)),
            None => (false, "target must be a key name string".to_string()),
        };
        CriterionResult {
            criterion_id: criterion.id.clone(),
            satisfied,
            reasoning,
        }
    }
}

/// `contains`: with target `{key, pattern}`, the state string under
/// `key` must contain `pattern`.
struct ContainsEvaluator;

impl CriterionEvaluator for ContainsEvaluator {
    fn metric(&self) -> &str {
        "contains"
    }

    fn evaluate(
        &self,
        criterion: &SuccessCriterion,
        state: &ExecutionState,
        _run_succeeded: bool,
    ) -> CriterionResult {
        let key = criterion.target.get("key").and_then(|v| v.as_str());
        let pattern = criterion.target.get("pattern").and_then(|v| v.as_str());

        let (satisfied, reasoning) = match (key, pattern) {
            (Some(key), Some(pattern)) => match state.get_str(key) {
                Some(s) if s.contains(pattern) => {
                    (true, format!("'{}' contains '{}'", key, pattern))
                }
                Some(_) => (false, format!("'{}' does not contain '{}'", key, pattern)),
                None => (false, format!("state has no string under '{}'", key)),
            },
            _ => (
                false,
                "target must be an object with 'key' and 'pattern'".to_string(),
            ),
        };
        CriterionResult {
            criterion_id: criterion.id.clone(),
            satisfied,
            reasoning,
        }
    }
}

/// `equals`: with target `{key, expected}`, exact value equality.
struct EqualsEvaluator;

impl CriterionEvaluator for EqualsEvaluator {
    fn metric(&self) -> &str {
        "equals"
    }

    fn evaluate(
        &self,
        criterion: &SuccessCriterion,
        state: &ExecutionState,
        _run_succeeded: bool,
    ) -> CriterionResult {
        let key = criterion.target.get("key").and_then(|v| v.as_str());
        let expected = criterion.target.get("expected");

        let (satisfied, reasoning) = match (key, expected) {
            (Some(key), Some(expected)) => match state.get(key) {
                Some(actual) if actual == expected => {
                    (true, format!("'{}' equals expected value", key))
                }
                Some(_) => (false, format!("'{}' differs from expected value", key)),
                None => (false, format!("state is missing key '{}'", key)),
            },
            _ => (
                false,
                "target must be an object with 'key' and 'expected'".to_string(),
            ),
        };
        CriterionResult {
            criterion_id: criterion.id.clone(),
            satisfied,
            reasoning,
        }
    }
}
