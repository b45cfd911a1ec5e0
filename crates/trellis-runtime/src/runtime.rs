use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use trellis_core::event::EventBus;
use trellis_core::types::StorageHandle;
use trellis_graph::GraphExecutor;

use crate::config::{RuntimeConfig, ToolServerConfig, ToolServersFile};

/// Per-session runtime context.
///
/// Owns the opaque storage handle, the shared event bus, and the registry
/// of declared external tool servers. Constructed once with a storage
/// location, shared by reference for the life of the session, and dropped
/// when the session ends. The runtime never interprets the storage
/// contents; it only hands the handle onward.
pub struct Runtime {
    storage: StorageHandle,
    config: RuntimeConfig,
    events: Arc<EventBus>,
    tool_servers: Mutex<HashMap<String, ToolServerConfig>>,
}

impl Runtime {
    /// Create a runtime rooted at a storage location.
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self::with_config(storage_path, RuntimeConfig::default())
    }

    /// Create a runtime with explicit configuration.
    pub fn with_config(storage_path: impl Into<PathBuf>, config: RuntimeConfig) -> Self {
        let storage = StorageHandle::new(storage_path);
        info!(storage = %storage.path().display(), "Runtime initialized");

        let tool_servers = config.tool_servers.clone();
        Self {
            storage,
            config,
            events: Arc::new(EventBus::default()),
            tool_servers: Mutex::new(tool_servers),
        }
    }

    /// The opaque storage handle.
    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The shared event bus executors publish on.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Declare an external tool server.
    ///
    /// Idempotent: re-registering a name overwrites the prior descriptor.
    pub async fn register_tool_server(&self, name: impl Into<String>, config: ToolServerConfig) {
        let name = name.into();
        let mut servers = self.tool_servers.lock().await;
        if servers.insert(name.clone(), config).is_some() {
            debug!(server = %name, "Tool server re-registered, descriptor replaced");
        } else {
            info!(server = %name, "Tool server registered");
        }
    }

    /// Look up a declared tool server.
    pub async fn tool_server(&self, name: &str) -> Option<ToolServerConfig> {
        self.tool_servers.lock().await.get(name).cloned()
    }

    /// Names of all declared tool servers.
    pub async fn tool_servers(&self) -> Vec<String> {
        self.tool_servers.lock().await.keys().cloned().collect()
    }

    /// Load tool-server declarations from a JSON file, registering each
    /// well-formed entry. Entries with neither command nor url are skipped.
    pub async fn load_tool_servers(&self, path: &std::path::Path) -> trellis_core::error::Result<usize> {
        let file = ToolServersFile::load(path)?;
        let mut registered = 0usize;
        for (name, entry) in &file.servers {
            match entry.to_server_config() {
                Some(config) => {
                    self.register_tool_server(name.clone(), config).await;
                    registered += 1;
                }
                None => {
                    warn!(server = %name, "Skipping tool server with neither command nor url");
                }
            }
        }
        Ok(registered)
    }

    /// A run logger writing under this runtime's storage, or `None` when
    /// logging is disabled by config.
    pub fn run_logger(&self) -> Option<crate::run_log::RunLogger> {
        crate::run_log::RunLogger::from_config(&self.storage, &self.config.log)
    }

    /// A graph executor wired with this runtime's storage handle, event
    /// bus, and cycle-guard setting. Register functions on the returned
    /// executor before running graphs.
    pub fn graph_executor(&self) -> GraphExecutor {
        GraphExecutor::new()
            .with_storage(self.storage.clone())
            .with_events(self.events.clone())
            .with_max_node_visits(self.config.max_node_visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolServerTransport;

    fn http_server(url: &str) -> ToolServerConfig {
        ToolServerConfig {
            transport: ToolServerTransport::Http { url: url.into() },
            timeout_secs: 120,
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let runtime = Runtime::new("/tmp/trellis-test");
        runtime
            .register_tool_server("search", http_server("http://localhost:4001"))
            .await;

        let found = runtime.tool_server("search").await.unwrap();
        assert!(matches!(
            found.transport,
            ToolServerTransport::Http { ref url } if url == "http://localhost:4001"
        ));
        assert!(runtime.tool_server("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_re_registration_overwrites() {
        let runtime = Runtime::new("/tmp/trellis-test");
        runtime
            .register_tool_server("search", http_server("http://localhost:4001"))
            .await;
        runtime
            .register_tool_server("search", http_server("http://localhost:9999"))
            .await;

        assert_eq!(runtime.tool_servers().await.len(), 1);
        let found = runtime.tool_server("search").await.unwrap();
        assert!(matches!(
            found.transport,
            ToolServerTransport::Http { ref url } if url == "http://localhost:9999"
        ));
    }

    #[tokio::test]
    async fn test_load_tool_servers_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_servers.json");
        std::fs::write(
            &path,
            r#"{
                "tools": {"transport": "stdio", "command": "python", "args": ["-m", "tool_server"]},
                "broken": {"transport": "stdio"},
                "remote": {"transport": "http", "url": "http://localhost:4001"}
            }"#,
        )
        .unwrap();

        let runtime = Runtime::new(dir.path());
        let registered = runtime.load_tool_servers(&path).await.unwrap();

        assert_eq!(registered, 2);
        assert!(runtime.tool_server("tools").await.is_some());
        assert!(runtime.tool_server("remote").await.is_some());
        assert!(runtime.tool_server("broken").await.is_none());
    }

    #[tokio::test]
    async fn test_executor_wiring() {
        let config = RuntimeConfig {
            max_node_visits: 3,
            ..RuntimeConfig::default()
        };
        let runtime = Runtime::with_config("/tmp/trellis-test", config);
        // Executor is usable and publishes on the runtime's bus.
        let executor = runtime.graph_executor();
        let mut rx = runtime.events().subscribe();
        executor.events().publish(trellis_core::event::ExecEvent::RunFailed {
            run_id: trellis_core::types::RunId::new(),
            error: "probe".into(),
        });
        assert!(rx.try_recv().is_ok());
    }
}
