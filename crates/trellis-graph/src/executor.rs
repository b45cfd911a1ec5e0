use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use trellis_core::error::{Result, TrellisError};
use trellis_core::event::{EventBus, ExecEvent};
use trellis_core::goal::Goal;
use trellis_core::types::{RunId, StorageHandle};

use crate::criteria::CriteriaEvaluators;
use crate::graph::GraphSpec;
use crate::registry::{FunctionRegistry, Handler, HandlerContext, HandlerOutput};
use crate::result::{ErrorDetail, ExecutionResult, NodeOutcome};
use crate::state::ExecutionState;

/// Default per-node visit budget; the iteration cap is node count times this.
const DEFAULT_MAX_NODE_VISITS: usize = 8;

/// Executes workflow graphs.
///
/// The executor owns the [`FunctionRegistry`] and walks a validated
/// [`GraphSpec`] one node at a time: resolve handler, gather declared
/// inputs, invoke, merge outputs, follow the first outgoing edge whose
/// condition matches the outcome. A run is single-shot: each `execute`
/// call moves PENDING → RUNNING → SUCCEEDED/FAILED over a fresh
/// [`ExecutionState`], and the same executor may drive any number of
/// runs, concurrently or in sequence.
///
/// Register all functions before starting concurrent runs; registration
/// takes `&mut self`, execution takes `&self`.
pub struct GraphExecutor {
    registry: FunctionRegistry,
    criteria: CriteriaEvaluators,
    events: Arc<EventBus>,
    storage: Option<StorageHandle>,
    cancel: CancellationToken,
    max_node_visits: usize,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self {
            registry: FunctionRegistry::new(),
            criteria: CriteriaEvaluators::with_builtins(),
            events: Arc::new(EventBus::default()),
            storage: None,
            cancel: CancellationToken::new(),
            max_node_visits: DEFAULT_MAX_NODE_VISITS,
        }
    }

    /// Attach the runtime's storage handle, passed through to handlers.
    pub fn with_storage(mut self, storage: StorageHandle) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Publish events on a shared bus instead of a private one.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Replace the criteria evaluator registry.
    pub fn with_criteria(mut self, criteria: CriteriaEvaluators) -> Self {
        self.criteria = criteria;
        self
    }

    /// Override the per-node visit budget guarding against cyclic graphs.
    pub fn with_max_node_visits(mut self, visits: usize) -> Self {
        self.max_node_visits = visits.max(1);
        self
    }

    /// Bind a plain function under a name (node id or function name).
    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(HashMap<String, serde_json::Value>) -> Result<HandlerOutput>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register_fn(name, f);
    }

    /// Bind a [`Handler`] implementation under a name.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: impl Handler) {
        self.registry.register(name, handler);
    }

    /// Mutable access to the registry, e.g. for tool-server bridging.
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// The bus this executor publishes [`ExecEvent`]s on.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// A clone of the cancellation token observed by in-flight runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all in-flight (and future) runs of this executor.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute a graph against a goal, seeding state with `input_data`.
    ///
    /// `Err` is returned only for structurally invalid graphs or goals.
    /// Every run-level failure (unregistered function, missing input,
    /// dead end, cycle, cancellation, escalated handler failure) comes
    /// back inside `Ok(ExecutionResult { success: false, error, .. })`.
    pub async fn execute(
        &self,
        graph: &GraphSpec,
        goal: &Goal,
        input_data: HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionResult> {
        self.execute_with_run_id(RunId::new(), graph, goal, input_data)
            .await
    }

    /// Execute under a caller-supplied run id, e.g. so a run logger can
    /// subscribe for the id before the run starts.
    pub async fn execute_with_run_id(
        &self,
        run_id: RunId,
        graph: &GraphSpec,
        goal: &Goal,
        input_data: HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionResult> {
        graph.validate()?;
        goal.validate()?;

        let start = Instant::now();
        let mut state = ExecutionState::from_map(input_data);
        let mut node_outcomes: Vec<NodeOutcome> = Vec::new();

        info!(run_id = %run_id, graph_id = %graph.id, goal_id = %goal.id, "Starting graph run");
        self.events.publish(ExecEvent::RunStarted {
            run_id: run_id.clone(),
            graph_id: graph.id.clone(),
        });

        let iteration_cap = graph.nodes.len().saturating_mul(self.max_node_visits);
        let mut iterations = 0usize;
        let mut current_id = graph.entry_node.clone();

        let walk: std::result::Result<(), TrellisError> = loop {
            if self.cancel.is_cancelled() {
                break Err(TrellisError::Cancelled);
            }
            iterations += 1;
            if iterations > iteration_cap {
                break Err(TrellisError::CycleDetected {
                    limit: iteration_cap,
                });
            }

            // Validation guarantees edge targets exist, so this holds for
            // every id the walk can reach.
            let node = match graph.node(&current_id) {
                Some(n) => n,
                None => {
                    break Err(TrellisError::Graph(format!(
                        "node '{}' not found in graph '{}'",
                        current_id, graph.id
                    )))
                }
            };

            let inputs = match state.gather_inputs(node) {
                Ok(inputs) => inputs,
                Err(key) => {
                    break Err(TrellisError::MissingInput {
                        node: node.id.clone(),
                        key,
                    })
                }
            };

            info!(node_id = %node.id, node_name = %node.name, "Executing node");
            self.events.publish(ExecEvent::NodeStarted {
                run_id: run_id.clone(),
                node_id: node.id.clone(),
            });

            let node_start = Instant::now();
            let ctx =
                HandlerContext::new(run_id.clone(), self.storage.clone(), self.cancel.clone());

            let invoked = tokio::select! {
                _ = self.cancel.cancelled() => break Err(TrellisError::Cancelled),
                result = self.registry.invoke(node, inputs, ctx) => result,
            };

            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            let (succeeded, node_error) = match invoked {
                Ok(output) => match state.apply_outputs(node, output) {
                    Ok(()) => (true, None),
                    Err(violation) => {
                        warn!(node_id = %node.id, %violation, "Output contract violation");
                        (false, Some(violation))
                    }
                },
                // A missing binding is a wiring mistake, fatal to the run.
                Err(err @ TrellisError::UnregisteredFunction { .. }) => break Err(err),
                Err(err) => {
                    warn!(node_id = %node.id, error = %err, "Node handler failed");
                    (false, Some(err.to_string()))
                }
            };

            node_outcomes.push(NodeOutcome {
                node_id: node.id.clone(),
                succeeded,
                elapsed_ms,
                error: node_error.clone(),
            });
            self.events.publish(ExecEvent::NodeCompleted {
                run_id: run_id.clone(),
                node_id: node.id.clone(),
                succeeded,
                elapsed_ms,
                error: node_error.clone(),
            });
            debug!(node_id = %node.id, succeeded, elapsed_ms, "Node complete");

            // First matching edge in declaration order wins: single active
            // path, no fan-out.
            let next = graph
                .edges_from(&node.id)
                .find(|e| e.condition.matches(succeeded, &state))
                .map(|e| e.target.clone());

            match next {
                Some(target) => current_id = target,
                None if !succeeded => {
                    // The node's own failure found no OnFailure/Always
                    // route, escalating it to a run failure.
                    break Err(TrellisError::HandlerFailure {
                        node: node.id.clone(),
                        message: node_error
                            .unwrap_or_else(|| "handler reported failure".to_string()),
                    });
                }
                None if graph.is_terminal(&node.id) => break Ok(()),
                None => break Err(TrellisError::DeadEnd {
                    node: node.id.clone(),
                }),
            }
        };

        let total_elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match walk {
            Ok(()) => {
                let goal_report = self.criteria.evaluate_goal(goal, &state, true);
                if !goal_report.satisfied {
                    info!(goal_id = %goal.id, "Run succeeded with unmet goal criteria");
                }
                info!(run_id = %run_id, total_elapsed_ms, "Graph run succeeded");
                self.events.publish(ExecEvent::RunCompleted {
                    run_id: run_id.clone(),
                    success: true,
                    total_elapsed_ms,
                });
                ExecutionResult {
                    run_id,
                    success: true,
                    output: state.into_data(),
                    error: None,
                    node_outcomes,
                    goal_report: Some(goal_report),
                    total_elapsed_ms,
                }
            }
            Err(err) => {
                let detail = ErrorDetail::from_error(&err);
                error!(run_id = %run_id, error = %err, "Graph run failed");
                self.events.publish(ExecEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: detail.message.clone(),
                });
                // A cancelled run discards its partially-accumulated state.
                let output = if matches!(err, TrellisError::Cancelled) {
                    HashMap::new()
                } else {
                    state.into_data()
                };
                ExecutionResult {
                    run_id,
                    success: false,
                    output,
                    error: Some(detail),
                    node_outcomes,
                    goal_report: None,
                    total_elapsed_ms,
                }
            }
        };

        Ok(result)
    }
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeSpec;
    use crate::node::NodeSpec;
    use crate::result::ErrorKind;

    fn two_node_graph() -> (GraphSpec, Goal) {
        let goal = Goal::new("search-processor", "Search Query Processor")
            .with_criterion(trellis_core::goal::SuccessCriterion::custom_any(
                "query_processed",
            ));
        let graph = GraphSpec::new(
            "demo-agent",
            "search-processor",
            "query_processor",
            vec!["result_formatter".into()],
            vec![
                NodeSpec::function("query_processor", "Query Processor", "process_query")
                    .with_inputs(vec!["query".into()])
                    .with_outputs(vec!["processed_query".into()]),
                NodeSpec::function("result_formatter", "Result Formatter", "format_result")
                    .with_inputs(vec!["processed_query".into()])
                    .with_outputs(vec!["final_result".into()]),
            ],
            vec![EdgeSpec::on_success(
                "process-to-format",
                "query_processor",
                "result_formatter",
            )],
        );
        (graph, goal)
    }

    fn register_demo_handlers(executor: &mut GraphExecutor) {
        executor.register_function("query_processor", |inputs| {
            let query = inputs["query"].as_str().unwrap_or_default();
            Ok(HandlerOutput::value(format!(
                "PROCESSED: {}",
                query.to_uppercase()
            )))
        });
        executor.register_function("result_formatter", |inputs| {
            let processed = inputs["processed_query"].as_str().unwrap_or_default();
            Ok(HandlerOutput::value(format!(
                "Search completed: {}",
                processed
            )))
        });
    }

    fn input(query: &str) -> HashMap<String, serde_json::Value> {
        HashMap::from([("query".to_string(), serde_json::json!(query))])
    }

    #[tokio::test]
    async fn test_linear_success_path() {
        let mut executor = GraphExecutor::new();
        register_demo_handlers(&mut executor);
        let (graph, goal) = two_node_graph();

        let result = executor
            .execute(&graph, &goal, input("artificial intelligence"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            result.output["final_result"],
            serde_json::json!("Search completed: PROCESSED: ARTIFICIAL INTELLIGENCE")
        );
        assert_eq!(result.node_outcomes.len(), 2);
        assert!(result.node_outcomes.iter().all(|o| o.succeeded));
        assert!(result.goal_report.as_ref().unwrap().satisfied);
    }

    #[tokio::test]
    async fn test_unregistered_function_is_fatal() {
        let executor = GraphExecutor::new();
        let (graph, goal) = two_node_graph();

        let result = executor.execute(&graph, &goal, input("ai")).await.unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::UnregisteredFunction);
        assert!(error.message.contains("query_processor"));
        assert!(result.node_outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_names_key_and_node() {
        let mut executor = GraphExecutor::new();
        register_demo_handlers(&mut executor);
        let (graph, goal) = two_node_graph();

        let result = executor
            .execute(&graph, &goal, HashMap::new())
            .await
            .unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::MissingInput);
        assert_eq!(error.node_id.as_deref(), Some("query_processor"));
        assert!(error.message.contains("'query'"));
    }

    #[tokio::test]
    async fn test_failure_routed_via_on_failure_edge() {
        let goal = Goal::new("g", "G");
        let graph = GraphSpec::new(
            "recovering",
            "g",
            "risky",
            vec!["fallback".into()],
            vec![
                NodeSpec::function("risky", "Risky", "try_it")
                    .with_outputs(vec!["value".into()]),
                NodeSpec::function("fallback", "Fallback", "recover")
                    .with_outputs(vec!["value".into()]),
            ],
            vec![EdgeSpec::on_failure("risky-fallback", "risky", "fallback")],
        );

        let mut executor = GraphExecutor::new();
        executor.register_function("risky", |_| {
            Err(TrellisError::HandlerFailure {
                node: "risky".into(),
                message: "nope".into(),
            })
        });
        executor.register_function("fallback", |_| Ok(HandlerOutput::value("recovered")));

        let result = executor.execute(&graph, &goal, HashMap::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output["value"], serde_json::json!("recovered"));
        assert!(!result.node_outcomes[0].succeeded);
        assert!(result.node_outcomes[1].succeeded);
    }

    #[tokio::test]
    async fn test_unrouted_failure_escalates() {
        let goal = Goal::new("g", "G");
        let graph = GraphSpec::new(
            "fragile",
            "g",
            "risky",
            vec!["done".into()],
            vec![
                NodeSpec::function("risky", "Risky", "try_it"),
                NodeSpec::function("done", "Done", "finish"),
            ],
            vec![EdgeSpec::on_success("risky-done", "risky", "done")],
        );

        let mut executor = GraphExecutor::new();
        executor.register_function("risky", |_| {
            Err(TrellisError::HandlerFailure {
                node: "risky".into(),
                message: "exploded".into(),
            })
        });
        executor.register_function("done", |_| Ok(HandlerOutput::value("unreached")));

        let result = executor.execute(&graph, &goal, HashMap::new()).await.unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::HandlerFailure);
        assert!(error.message.contains("exploded"));
    }

    #[tokio::test]
    async fn test_dead_end_on_successful_non_terminal() {
        let goal = Goal::new("g", "G");
        let graph = GraphSpec::new(
            "stuck",
            "g",
            "first",
            vec!["last".into()],
            vec![
                NodeSpec::function("first", "First", "f1"),
                NodeSpec::function("last", "Last", "f2"),
            ],
            // Only a failure route: success at `first` strands the walk.
            vec![EdgeSpec::on_failure("first-last", "first", "last")],
        );

        let mut executor = GraphExecutor::new();
        executor.register_function("first", |_| Ok(HandlerOutput::value("ok")));
        executor.register_function("last", |_| Ok(HandlerOutput::value("ok")));

        let result = executor.execute(&graph, &goal, HashMap::new()).await.unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::DeadEnd);
        assert_eq!(error.node_id.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_cycle_detection() {
        let goal = Goal::new("g", "G");
        let graph = GraphSpec::new(
            "loopy",
            "g",
            "a",
            vec!["a".into()],
            vec![NodeSpec::function("a", "A", "fa")],
            vec![EdgeSpec::always("a-a", "a", "a")],
        );

        let mut executor = GraphExecutor::new().with_max_node_visits(4);
        executor.register_function("a", |_| Ok(HandlerOutput::value("again")));

        let result = executor.execute(&graph, &goal, HashMap::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::CycleDetected);
        assert_eq!(result.node_outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_when_edge_routes_on_state() {
        let goal = Goal::new("g", "G");
        let graph = GraphSpec::new(
            "branching",
            "g",
            "classify",
            vec!["urgent".into(), "routine".into()],
            vec![
                NodeSpec::function("classify", "Classify", "classify")
                    .with_inputs(vec!["ticket".into()])
                    .with_outputs(vec!["severity".into()]),
                NodeSpec::function("urgent", "Urgent", "escalate")
                    .with_outputs(vec!["handled_by".into()]),
                NodeSpec::function("routine", "Routine", "queue")
                    .with_outputs(vec!["handled_by".into()]),
            ],
            vec![
                EdgeSpec::when("to-urgent", "classify", "urgent", r#"severity == "high""#),
                EdgeSpec::always("to-routine", "classify", "routine"),
            ],
        );

        let mut executor = GraphExecutor::new();
        executor.register_function("classify", |inputs| {
            let ticket = inputs["ticket"].as_str().unwrap_or_default();
            let severity = if ticket.contains("outage") { "high" } else { "low" };
            Ok(HandlerOutput::value(severity))
        });
        executor.register_function("urgent", |_| Ok(HandlerOutput::value("pager")));
        executor.register_function("routine", |_| Ok(HandlerOutput::value("backlog")));

        let result = executor
            .execute(
                &graph,
                &goal,
                HashMap::from([("ticket".to_string(), serde_json::json!("total outage"))]),
            )
            .await
            .unwrap();
        assert_eq!(result.output["handled_by"], serde_json::json!("pager"));

        let result = executor
            .execute(
                &graph,
                &goal,
                HashMap::from([("ticket".to_string(), serde_json::json!("typo fix"))]),
            )
            .await
            .unwrap();
        assert_eq!(result.output["handled_by"], serde_json::json!("backlog"));
    }

    #[tokio::test]
    async fn test_invalid_graph_is_err_not_result() {
        let executor = GraphExecutor::new();
        let goal = Goal::new("g", "G");
        let mut graph = two_node_graph().0;
        graph.entry_node = "ghost".into();

        let err = executor
            .execute(&graph, &goal, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::Graph(_)));
    }

    #[tokio::test]
    async fn test_cancellation_discards_state() {
        let mut executor = GraphExecutor::new();
        register_demo_handlers(&mut executor);
        let (graph, goal) = two_node_graph();

        executor.cancel();
        let result = executor.execute(&graph, &goal, input("ai")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Cancelled);
        assert!(result.output.is_empty());
    }
}
