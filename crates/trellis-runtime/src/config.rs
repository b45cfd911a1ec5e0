use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use trellis_core::error::{Result, TrellisError};

/// Runtime configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Run-log settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Per-node visit budget guarding against cyclic graphs.
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: usize,
    /// Tool servers declared directly in the config file.
    #[serde(default)]
    pub tool_servers: HashMap<String, ToolServerConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            max_node_visits: default_max_node_visits(),
            tool_servers: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TrellisError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| TrellisError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <storage>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Logging level: 1 = run boundaries only, 2 = per-node (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: 2,
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }
fn default_max_node_visits() -> usize { 8 }

/// Declaration of a single external tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub transport: ToolServerTransport,
    /// Per-tool-call timeout in seconds. Default: 120.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 { 120 }

/// Tool server transport descriptor.
///
/// Consumed, not interpreted: the engine hands the descriptor to whatever
/// [`ToolServerClient`] implementation speaks the protocol.
///
/// [`ToolServerClient`]: crate::bridge::ToolServerClient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolServerTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

/// The on-disk tool-server declaration file (`tool_servers.json`):
/// a map from server name to a loose entry with either a command (stdio)
/// or a url (http).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolServersFile {
    #[serde(flatten)]
    pub servers: HashMap<String, ToolServerEntry>,
}

/// A single entry in the declaration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerEntry {
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ToolServerEntry {
    /// Convert to a typed config; `None` when the entry declares neither
    /// a command nor a url.
    pub fn to_server_config(&self) -> Option<ToolServerConfig> {
        let transport = if let Some(ref command) = self.command {
            ToolServerTransport::Stdio {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            }
        } else if let Some(ref url) = self.url {
            ToolServerTransport::Http { url: url.clone() }
        } else {
            return None;
        };

        Some(ToolServerConfig {
            transport,
            timeout_secs: self.timeout_secs.unwrap_or_else(default_tool_timeout),
        })
    }
}

impl ToolServersFile {
    /// Load a declaration file from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TrellisError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| TrellisError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }
}
