use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::NodeSpec;
use crate::registry::HandlerOutput;

/// Accumulated key/value data for one in-flight execution.
///
/// Seeded from the caller's input data, grown by node outputs, owned
/// exclusively by a single run. Keys are strings; values are JSON so the
/// engine itself stays type-agnostic; handlers assert the shapes they need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    data: HashMap<String, serde_json::Value>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed state from initial input data.
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Set a value (overwrites any existing value under the key).
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// The slice of state a node is allowed to see: exactly its declared
    /// input keys. Returns the name of the first absent key on failure.
    pub fn gather_inputs(
        &self,
        node: &NodeSpec,
    ) -> Result<HashMap<String, serde_json::Value>, String> {
        let mut inputs = HashMap::with_capacity(node.input_keys.len());
        for key in &node.input_keys {
            match self.data.get(key) {
                Some(value) => {
                    inputs.insert(key.clone(), value.clone());
                }
                None => return Err(key.clone()),
            }
        }
        Ok(inputs)
    }

    /// Merge a handler's output under the node's declared output keys.
    ///
    /// A single value binds to a sole output key; a map is consulted for
    /// each declared key. Last writer wins on key collision. Returns a
    /// description of the contract violation on mismatch.
    pub fn apply_outputs(
        &mut self,
        node: &NodeSpec,
        output: HandlerOutput,
    ) -> Result<(), String> {
        match output {
            HandlerOutput::Value(value) => match node.output_keys.as_slice() {
                [key] => {
                    self.data.insert(key.clone(), value);
                    Ok(())
                }
                [] => Ok(()), // nothing declared, nothing stored
                keys => Err(format!(
                    "handler returned a single value but node declares {} output keys",
                    keys.len()
                )),
            },
            HandlerOutput::Map(mut map) => {
                for key in &node.output_keys {
                    match map.remove(key) {
                        Some(value) => {
                            self.data.insert(key.clone(), value);
                        }
                        None => {
                            return Err(format!(
                                "handler output is missing declared key '{}'",
                                key
                            ));
                        }
                    }
                }
                // Undeclared keys in the map are dropped: a node only
                // publishes what it declared.
                Ok(())
            }
        }
    }

    /// The underlying data map.
    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }

    /// Consume the state, yielding the final output mapping.
    pub fn into_data(self) -> HashMap<String, serde_json::Value> {
        self.data
    }
}
