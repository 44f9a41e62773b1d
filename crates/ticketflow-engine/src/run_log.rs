use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use ticketflow_core::config::LogConfig;
use ticketflow_core::event::EventBus;
use ticketflow_core::types::{RunId, WorkflowEvent};

/// JSONL audit logger for one workflow run.
///
/// Listens on the EventBus and writes one JSON object per line to
/// `{log_dir}/{run_id}/{timestamp}.jsonl`. Lines are flushed as they are
/// written, so a crash mid-run leaves every earlier line intact. The
/// `run_completed` line carries the final state as the audit record.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1=run summary, 2=per stage, 3=per route.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.log_dir(), config.level)
    }

    /// Subscribe now and log in a background task.
    ///
    /// The subscription is taken before this returns, so no event published
    /// afterwards is missed. The task yields the log file path.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<PathBuf>> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, run_id, cancel))
    }

    /// Write entries for `run_id` until it completes or fails, the bus
    /// closes, or `cancel` fires.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<WorkflowEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let run_dir = self.log_dir.join(&run_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
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
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
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
                            if event.run_id() != &run_id {
                                continue;
                            }
                            if let Some(entry) = self.event_to_entry(&event) {
                                if let Ok(json) = serde_json::to_string(&entry) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write log entry");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush log");
                                    }
                                }
                            }
                            if matches!(event, WorkflowEvent::RunCompleted { .. } | WorkflowEvent::RunFailed { .. }) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }

    /// Convert an event to a log entry, or None if filtered by level.
    fn event_to_entry(&self, event: &WorkflowEvent) -> Option<LogEntry> {
        let entry = |event_type: &str, stage: Option<&str>, detail: Option<serde_json::Value>| {
            LogEntry {
                timestamp: Utc::now().to_rfc3339(),
                run_id: event.run_id().0.clone(),
                event_type: event_type.to_string(),
                stage: stage.map(str::to_string),
                detail,
            }
        };

        match event {
            // L1: run summary
            WorkflowEvent::RunStarted { ticket_id, .. } => Some(entry(
                "run_started",
                None,
                Some(serde_json::json!({ "ticket_id": ticket_id })),
            )),
            WorkflowEvent::RunCompleted {
                final_status,
                total_elapsed_ms,
                state,
                ..
            } => Some(entry(
                "run_completed",
                None,
                Some(serde_json::json!({
                    "final_status": final_status,
                    "total_elapsed_ms": total_elapsed_ms,
                    "state": state,
                })),
            )),
            WorkflowEvent::RunFailed {
                last_completed,
                kind,
                error,
                log,
                ..
            } => Some(entry(
                "run_failed",
                None,
                Some(serde_json::json!({
                    "last_completed": last_completed,
                    "kind": kind,
                    "error": error,
                    "log": log,
                })),
            )),

            // L2: per stage
            WorkflowEvent::StageStarted { stage, .. } if self.level >= 2 => {
                Some(entry("stage_started", Some(stage.as_str()), None))
            }
            WorkflowEvent::StageCompleted {
                stage,
                elapsed_ms,
                log_len,
                ..
            } if self.level >= 2 => Some(entry(
                "stage_completed",
                Some(stage.as_str()),
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms, "log_len": log_len })),
            )),

            // L3: routing decisions
            WorkflowEvent::RouteSelected {
                from, label, to, ..
            } if self.level >= 3 => Some(entry(
                "route_selected",
                Some(from.as_str()),
                Some(serde_json::json!({ "label": label, "to": to })),
            )),

            _ => None,
        }
    }
}
