use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use trellis_core::error::{Result, TrellisError};

use crate::edge::EdgeSpec;
use crate::node::NodeSpec;

/// The declarative definition of a workflow graph.
///
/// Constructed once, validated, then shared read-only across any number of
/// executions. Edge declaration order is significant: when several outgoing
/// edges match a node's outcome, the first declared one is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Unique identifier for this graph.
    pub id: String,
    /// The goal this graph is executed against.
    pub goal_id: String,
    /// Node where traversal begins.
    pub entry_node: String,
    /// Nodes whose outcome ends the run when no further edge matches.
    pub terminal_nodes: Vec<String>,
    /// The nodes of the graph.
    pub nodes: Vec<NodeSpec>,
    /// The directed edges of the graph, in declaration order.
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl GraphSpec {
    pub fn new(
        id: impl Into<String>,
        goal_id: impl Into<String>,
        entry_node: impl Into<String>,
        terminal_nodes: Vec<String>,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Self {
        Self {
            id: id.into(),
            goal_id: goal_id.into(),
            entry_node: entry_node.into(),
            terminal_nodes,
            nodes,
            edges,
        }
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Whether a node id is terminal.
    pub fn is_terminal(&self, id: &str) -> bool {
        self.terminal_nodes.iter().any(|t| t == id)
    }

    /// Outgoing edges of a node, preserving declaration order.
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a EdgeSpec> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Check structural invariants.
    ///
    /// Unique non-empty node ids, existing entry and terminal nodes, edge
    /// endpoints referencing known nodes, non-empty key names, and every
    /// node reachable from the entry. Unreachable nodes are a construction
    /// mistake, caught here rather than silently skipped at run time.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TrellisError::Graph("graph id must not be empty".into()));
        }
        if self.nodes.is_empty() {
            return Err(TrellisError::Graph(format!(
                "graph '{}' has no nodes",
                self.id
            )));
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(TrellisError::Graph(format!(
                    "graph '{}' has a node with an empty id",
                    self.id
                )));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(TrellisError::Graph(format!(
                    "graph '{}' has duplicate node id '{}'",
                    self.id, node.id
                )));
            }
            if node.function.trim().is_empty() {
                return Err(TrellisError::Graph(format!(
                    "node '{}' has an empty function name",
                    node.id
                )));
            }
            for key in node.input_keys.iter().chain(node.output_keys.iter()) {
                if key.trim().is_empty() {
                    return Err(TrellisError::Graph(format!(
                        "node '{}' declares an empty input/output key",
                        node.id
                    )));
                }
            }
        }

        if !ids.contains(self.entry_node.as_str()) {
            return Err(TrellisError::Graph(format!(
                "entry node '{}' does not exist in graph '{}'",
                self.entry_node, self.id
            )));
        }
        if self.terminal_nodes.is_empty() {
            return Err(TrellisError::Graph(format!(
                "graph '{}' declares no terminal nodes",
                self.id
            )));
        }
        for terminal in &self.terminal_nodes {
            if !ids.contains(terminal.as_str()) {
                return Err(TrellisError::Graph(format!(
                    "terminal node '{}' does not exist in graph '{}'",
                    terminal, self.id
                )));
            }
        }

        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) {
                return Err(TrellisError::Graph(format!(
                    "edge '{}' references unknown source node '{}'",
                    edge.id, edge.source
                )));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(TrellisError::Graph(format!(
                    "edge '{}' references unknown target node '{}'",
                    edge.id, edge.target
                )));
            }
        }

        // Reachability walk from the entry node.
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::from([self.entry_node.as_str()]);
        while let Some(id) = queue.pop_front() {
            if reachable.insert(id) {
                if let Some(targets) = adjacency.get(id) {
                    queue.extend(targets.iter().copied());
                }
            }
        }
        for node in &self.nodes {
            if !reachable.contains(node.id.as_str()) {
                return Err(TrellisError::Graph(format!(
                    "node '{}' is not reachable from entry node '{}'",
                    node.id, self.entry_node
                )));
            }
        }

        Ok(())
    }
}
