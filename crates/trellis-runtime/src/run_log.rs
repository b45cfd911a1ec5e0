use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use trellis_core::event::{EventBus, ExecEvent};
use trellis_core::types::{RunId, StorageHandle};

use crate::config::LogConfig;

/// JSONL run logger.
///
/// Subscribes to the event bus and writes structured log entries as JSONL
/// (one JSON object per line). The format is append-only and
/// crash-resilient: even if the process dies mid-run, all previously
/// written lines are intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// Create a new RunLogger.
    ///
    /// `log_dir` is the base directory; logs are written to
    /// `{log_dir}/{run_id}/{timestamp}.jsonl`.
    /// `level` controls verbosity: 1 = run boundaries, 2 = per-node.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Build a logger under `<storage>/logs` per config; `None` when
    /// logging is disabled.
    pub fn from_config(storage: &StorageHandle, config: &LogConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let log_dir = match &config.log_dir {
            Some(dir) => PathBuf::from(dir),
            None => storage.join("logs"),
        };
        Some(Self::new(log_dir, config.level))
    }

    /// Run the logger as a background task.
    ///
    /// Subscribes to the event bus and writes entries for `run_id` until
    /// the run completes or fails, or until cancellation.
    pub async fn run(self, events: Arc<EventBus>, run_id: RunId, cancel: CancellationToken) {
        // Subscribe before any filesystem work so no early event is missed.
        let mut rx = events.subscribe();

        let run_dir = self.log_dir.join(&run_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create run log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = run_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open run log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let entry = match self.event_to_entry(&run_id, &event) {
                                Some(e) => e,
                                None => continue,
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write run log entry");
                                    break;
                                }
                                // Flush after each entry for crash resilience
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush run log");
                                }
                            }

                            if matches!(
                                event,
                                ExecEvent::RunCompleted { run_id: ref rid, .. }
                                | ExecEvent::RunFailed { run_id: ref rid, .. }
                                if *rid == run_id
                            ) {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            debug!("Event bus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Map an event to a log entry, filtered by run id and level.
    fn event_to_entry(&self, run_id: &RunId, event: &ExecEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, node_id: Option<String>, detail: Option<serde_json::Value>| {
            Some(LogEntry {
                timestamp: Utc::now().to_rfc3339(),
                run_id: run_id.0.clone(),
                event_type: event_type.to_string(),
                node_id,
                detail,
            })
        };

        match event {
            ExecEvent::RunStarted { run_id: rid, graph_id } if rid == run_id => entry(
                "run_started",
                None,
                Some(serde_json::json!({ "graph_id": graph_id })),
            ),
            ExecEvent::NodeStarted { run_id: rid, node_id } if rid == run_id && self.level >= 2 => {
                entry("node_started", Some(node_id.clone()), None)
            }
            ExecEvent::NodeCompleted {
                run_id: rid,
                node_id,
                succeeded,
                elapsed_ms,
                error,
            } if rid == run_id && self.level >= 2 => entry(
                "node_completed",
                Some(node_id.clone()),
                Some(serde_json::json!({
                    "succeeded": succeeded,
                    "elapsed_ms": elapsed_ms,
                    "error": error,
                })),
            ),
            ExecEvent::RunCompleted {
                run_id: rid,
                success,
                total_elapsed_ms,
            } if rid == run_id => entry(
                "run_completed",
                None,
                Some(serde_json::json!({
                    "success": success,
                    "total_elapsed_ms": total_elapsed_ms,
                })),
            ),
            ExecEvent::RunFailed { run_id: rid, error } if rid == run_id => entry(
                "run_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            ),
            _ => None,
        }
    }
}
