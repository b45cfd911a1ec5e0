//! Runtime session facilities around the graph executor.
//!
//! A [`Runtime`] is constructed once per session with a storage location.
//! It owns the shared event bus, the registry of declared external tool
//! servers, and hands out [`GraphExecutor`]s wired with its facilities.
//! Tool-server transports themselves live behind the [`ToolServerClient`]
//! boundary; the engine only consumes descriptors and adapted handlers.
//!
//! [`GraphExecutor`]: trellis_graph::GraphExecutor

pub mod bridge;
pub mod config;
pub mod run_log;
pub mod runtime;

pub use bridge::{register_server_tools, RemoteToolSpec, ToolServerClient};
pub use config::{LogConfig, RuntimeConfig, ToolServerConfig, ToolServerTransport};
pub use run_log::RunLogger;
pub use runtime::Runtime;
