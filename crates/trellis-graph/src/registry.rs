use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::{RunId, StorageHandle};

use crate::node::NodeSpec;

/// What a handler produced: a single value (bound to the node's sole
/// output key) or a mapping consulted for each declared output key.
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    Value(serde_json::Value),
    Map(HashMap<String, serde_json::Value>),
}

impl HandlerOutput {
    pub fn value(v: impl Into<serde_json::Value>) -> Self {
        Self::Value(v.into())
    }
}

impl From<serde_json::Value> for HandlerOutput {
    fn from(v: serde_json::Value) -> Self {
        Self::Value(v)
    }
}

impl From<HashMap<String, serde_json::Value>> for HandlerOutput {
    fn from(m: HashMap<String, serde_json::Value>) -> Self {
        Self::Map(m)
    }
}

/// Context passed to handlers during invocation.
///
/// Carries the run id, the runtime's opaque storage handle (when one is
/// configured) and the run's cancellation token so long-running handlers
/// can bail out early.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub run_id: RunId,
    pub storage: Option<StorageHandle>,
    pub cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(run_id: RunId, storage: Option<StorageHandle>, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            storage,
            cancel,
        }
    }
}

/// An invocable node function.
///
/// Implementations receive exactly the node's declared input keys and
/// report functional failure by returning `Err`; the executor routes such
/// failures through `OnFailure` edges rather than aborting the run.
pub trait Handler: Send + Sync + 'static {
    /// Invoke the handler with gathered inputs.
    fn invoke(
        &self,
        inputs: HashMap<String, serde_json::Value>,
        ctx: HandlerContext,
    ) -> BoxFuture<'_, Result<HandlerOutput>>;

    /// Timeout in seconds for one invocation.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Adapter for plain synchronous functions, the dominant handler shape.
struct FnHandler<F> {
    f: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(HashMap<String, serde_json::Value>) -> Result<HandlerOutput> + Send + Sync + 'static,
{
    fn invoke(
        &self,
        inputs: HashMap<String, serde_json::Value>,
        _ctx: HandlerContext,
    ) -> BoxFuture<'_, Result<HandlerOutput>> {
        let result = (self.f)(inputs);
        Box::pin(async move { result })
    }
}

/// Registry of invocable functions, keyed by name.
///
/// Registration is last-write-wins: re-registering a name silently
/// replaces the prior binding. Lookups resolve at invocation time, never
/// cached across graph mutations.
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler to a name (overwrites any prior binding).
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler) {
        let name = name.into();
        debug!(function = %name, "Registering function");
        self.handlers.insert(name, Arc::new(handler));
    }

    /// Bind a plain synchronous closure to a name.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(HashMap<String, serde_json::Value>) -> Result<HandlerOutput>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnHandler { f });
    }

    /// Remove a binding by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Get a handler by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    /// List all registered names.
    pub fn list(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve the handler for a node: node id first, then function name.
    ///
    /// Callers commonly register directly under node ids; the fallback to
    /// the node's `function` field keeps shared handlers addressable.
    pub fn resolve(&self, node: &NodeSpec) -> Option<Arc<dyn Handler>> {
        self.get(&node.id).or_else(|| self.get(&node.function))
    }

    /// Invoke a node's handler with a per-invocation timeout.
    ///
    /// `Err(UnregisteredFunction)` when no binding exists (fatal to the
    /// run); any other `Err`, including a timeout, is a functional
    /// failure for the node, routed via `OnFailure` edges.
    pub async fn invoke(
        &self,
        node: &NodeSpec,
        inputs: HashMap<String, serde_json::Value>,
        ctx: HandlerContext,
    ) -> Result<HandlerOutput> {
        let handler = self
            .resolve(node)
            .ok_or_else(|| TrellisError::UnregisteredFunction {
                node: node.id.clone(),
                function: node.function.clone(),
            })?;

        let timeout = std::time::Duration::from_secs(handler.timeout_secs());

        match tokio::time::timeout(timeout, handler.invoke(inputs, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(TrellisError::HandlerTimeout {
                node: node.id.clone(),
                timeout_secs: handler.timeout_secs(),
            }),
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
