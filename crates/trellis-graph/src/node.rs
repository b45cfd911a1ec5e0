use serde::{Deserialize, Serialize};

/// A node in the workflow graph.
///
/// Each node names a function resolved against the [`FunctionRegistry`] at
/// invocation time. Input keys define the slice of execution state the
/// handler receives; output keys define where its result lands. A node
/// never sees state beyond its declared input keys.
///
/// [`FunctionRegistry`]: crate::registry::FunctionRegistry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within the graph.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What this node does.
    #[serde(default)]
    pub description: String,
    /// Kind of node (currently only function-backed).
    #[serde(default)]
    pub node_type: NodeType,
    /// Function name resolved against the registry.
    pub function: String,
    /// Keys read from execution state before invocation.
    #[serde(default)]
    pub input_keys: Vec<String>,
    /// Keys the function's result populates in execution state.
    #[serde(default)]
    pub output_keys: Vec<String>,
}

/// Kind of node. A tag rather than behavior: future node kinds (e.g.
/// sub-graphs) slot in as new variants without touching existing specs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeType {
    #[default]
    Function,
}

impl NodeSpec {
    /// Create a function-backed node.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            node_type: NodeType::Function,
            function: function.into(),
            input_keys: vec![],
            output_keys: vec![],
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input keys.
    pub fn with_inputs(mut self, keys: Vec<String>) -> Self {
        self.input_keys = keys;
        self
    }

    /// Set the output keys.
    pub fn with_outputs(mut self, keys: Vec<String>) -> Self {
        self.output_keys = keys;
        self
    }
}
