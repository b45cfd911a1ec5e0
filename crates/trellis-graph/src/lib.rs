//! Workflow Graph Engine: goal-directed execution of declarative node graphs.
//!
//! A workflow is a directed graph of function-backed [`NodeSpec`]s connected
//! by [`EdgeSpec`]s with conditions (Always, OnSuccess, OnFailure, or a
//! `When` expression over execution state).
//!
//! The [`GraphExecutor`] walks the graph from the entry node, invoking each
//! node's registered [`Handler`] with the subset of accumulated state named
//! by its input keys, merging outputs back under its output keys, and
//! following the first outgoing edge whose condition matches the node's
//! outcome. The walk ends at a terminal node or on a fatal failure, and the
//! goal's success criteria are evaluated into an informational report.

pub mod criteria;
pub mod edge;
pub mod executor;
pub mod graph;
pub mod node;
pub mod registry;
pub mod result;
pub mod state;

pub use criteria::{CriteriaEvaluators, CriterionEvaluator};
pub use edge::{EdgeCondition, EdgeSpec};
pub use executor::GraphExecutor;
pub use graph::GraphSpec;
pub use node::{NodeSpec, NodeType};
pub use registry::{FunctionRegistry, Handler, HandlerContext, HandlerOutput};
pub use result::{ErrorDetail, ErrorKind, ExecutionResult, NodeOutcome};
pub use state::ExecutionState;
