use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_graph::{FunctionRegistry, Handler, HandlerContext, HandlerOutput};

/// Protocol boundary to a connected tool server.
///
/// Implementations own the transport (stdio subprocess, HTTP, ...) and
/// expose one uniform call: invoke a named remote tool with JSON
/// arguments, get a JSON value or an error. The engine never speaks the
/// wire protocol itself.
pub trait ToolServerClient: Send + Sync + 'static {
    /// Call a tool on the server.
    fn call_tool(
        &self,
        tool: &str,
        args: HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// A tool advertised by a connected server.
#[derive(Debug, Clone)]
pub struct RemoteToolSpec {
    pub name: String,
    pub description: String,
}

/// A handler that forwards invocation to a remote tool.
/// Registered name format: `{server}__{tool}`.
struct BridgedHandler {
    server_name: String,
    tool_name: String,
    client: Arc<dyn ToolServerClient>,
    timeout: u64,
}

impl Handler for BridgedHandler {
    fn invoke(
        &self,
        inputs: HashMap<String, serde_json::Value>,
        _ctx: HandlerContext,
    ) -> BoxFuture<'_, Result<HandlerOutput>> {
        let server = self.server_name.clone();
        let tool = self.tool_name.clone();
        let client = self.client.clone();

        Box::pin(async move {
            debug!(server = %server, tool = %tool, "Calling tool server");

            match client.call_tool(&tool, inputs).await {
                Ok(value) => Ok(HandlerOutput::Value(value)),
                // A remote error is a functional node failure, routed via
                // OnFailure edges like any local handler error.
                Err(e) => Err(TrellisError::ToolServer {
                    server,
                    message: e.to_string(),
                }),
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout
    }
}

/// Register every advertised tool of a server into the function registry.
///
/// Remote tools become ordinary registry entries resolvable by graph
/// nodes; re-running for the same server overwrites the prior bindings.
pub fn register_server_tools(
    registry: &mut FunctionRegistry,
    client: &Arc<dyn ToolServerClient>,
    server_name: &str,
    tools: &[RemoteToolSpec],
    timeout_secs: u64,
) {
    for tool in tools {
        let bound_name = format!("{}__{}", server_name, tool.name);

        let bridged = BridgedHandler {
            server_name: server_name.to_string(),
            tool_name: tool.name.clone(),
            client: client.clone(),
            timeout: timeout_secs,
        };

        registry.register(bound_name.clone(), bridged);
        debug!(name = %bound_name, "Registered bridged tool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use trellis_core::types::RunId;
    use trellis_graph::NodeSpec;

    /// Fake server: echoes its arguments back, fails for tool "broken".
    struct EchoServer;

    impl ToolServerClient for EchoServer {
        fn call_tool(
            &self,
            tool: &str,
            args: HashMap<String, serde_json::Value>,
        ) -> BoxFuture<'_, Result<serde_json::Value>> {
            let tool = tool.to_string();
            Box::pin(async move {
                if tool == "broken" {
                    return Err(TrellisError::ToolServer {
                        server: "echo".into(),
                        message: "remote crash".into(),
                    });
                }
                Ok(serde_json::json!({ "tool": tool, "args": args }))
            })
        }
    }

    fn ctx() -> HandlerContext {
        HandlerContext::new(RunId::new(), None, CancellationToken::new())
    }

    fn specs(names: &[&str]) -> Vec<RemoteToolSpec> {
        names
            .iter()
            .map(|n| RemoteToolSpec {
                name: n.to_string(),
                description: format!("remote tool {}", n),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_bridged_tools_resolve_through_registry() {
        let mut registry = FunctionRegistry::new();
        let client: Arc<dyn ToolServerClient> = Arc::new(EchoServer);
        register_server_tools(&mut registry, &client, "echo", &specs(&["web_search"]), 120);

        let node = NodeSpec::function("n1", "N1", "echo__web_search");
        let mut inputs = HashMap::new();
        inputs.insert("query".to_string(), serde_json::json!("rust"));

        let output = registry.invoke(&node, inputs, ctx()).await.unwrap();
        match output {
            HandlerOutput::Value(v) => {
                assert_eq!(v["tool"], serde_json::json!("web_search"));
                assert_eq!(v["args"]["query"], serde_json::json!("rust"));
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_error_is_functional_failure() {
        let mut registry = FunctionRegistry::new();
        let client: Arc<dyn ToolServerClient> = Arc::new(EchoServer);
        register_server_tools(&mut registry, &client, "echo", &specs(&["broken"]), 120);

        let node = NodeSpec::function("n1", "N1", "echo__broken");
        let err = registry.invoke(&node, HashMap::new(), ctx()).await.unwrap_err();
        assert!(matches!(err, TrellisError::ToolServer { .. }));
        assert!(err.to_string().contains("remote crash"));
    }

    #[tokio::test]
    async fn test_re_registration_overwrites_bindings() {
        struct ConstServer(&'static str);
        impl ToolServerClient for ConstServer {
            fn call_tool(
                &self,
                _tool: &str,
                _args: HashMap<String, serde_json::Value>,
            ) -> BoxFuture<'_, Result<serde_json::Value>> {
                let v = self.0;
                Box::pin(async move { Ok(serde_json::json!(v)) })
            }
        }

        let mut registry = FunctionRegistry::new();
        let first: Arc<dyn ToolServerClient> = Arc::new(ConstServer("first"));
        let second: Arc<dyn ToolServerClient> = Arc::new(ConstServer("second"));
        register_server_tools(&mut registry, &first, "srv", &specs(&["t"]), 120);
        register_server_tools(&mut registry, &second, "srv", &specs(&["t"]), 120);

        let node = NodeSpec::function("n1", "N1", "srv__t");
        let output = registry.invoke(&node, HashMap::new(), ctx()).await.unwrap();
        match output {
            HandlerOutput::Value(v) => assert_eq!(v, serde_json::json!("second")),
            other => panic!("unexpected output: {:?}", other),
        }
    }
}
