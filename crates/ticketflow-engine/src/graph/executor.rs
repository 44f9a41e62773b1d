use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use ticketflow_core::config::EngineConfig;
use ticketflow_core::error::TicketflowError;
use ticketflow_core::event::EventBus;
use ticketflow_core::traits::CapabilityProvider;
use ticketflow_core::types::{RunId, WorkflowEvent};
use ticketflow_core::{StateField, WorkflowState};

use super::definition::{Outgoing, WorkflowDefinition};
use super::edge::Target;

/// One executed stage, in run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Which stage ran.
    pub stage: String,
    /// Route label chosen after it, for branch points.
    pub label: Option<String>,
    /// Where the run went next.
    pub next: Target,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// A run that reached the terminal marker.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: RunId,
    /// Final state, including the full log.
    pub state: WorkflowState,
    /// Per-stage records in execution order.
    pub stage_results: Vec<StageRecord>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn log(&self) -> &[String] {
        self.state.log()
    }

    /// Stage names in execution order.
    pub fn path(&self) -> Vec<&str> {
        self.stage_results.iter().map(|r| r.stage.as_str()).collect()
    }
}

/// A run that aborted. Carries everything accumulated up to the failure.
#[derive(Debug, Error)]
#[error("run failed at {failed_stage}: {error}")]
pub struct RunFailure {
    pub run_id: RunId,
    #[source]
    pub error: TicketflowError,
    /// Stage being executed or routed from when the run aborted.
    pub failed_stage: String,
    /// Last stage that returned successfully.
    pub last_completed: Option<String>,
    /// State as of the failure, with a trailing failure log entry.
    pub state: WorkflowState,
    pub stage_results: Vec<StageRecord>,
}

impl RunFailure {
    pub fn log(&self) -> &[String] {
        self.state.log()
    }

    /// Human-readable failure report: last completed stage, error kind,
    /// accumulated log.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Run {} failed\n  last completed stage: {}\n  error kind: {}\n  error: {}\n  log:\n",
            self.run_id,
            self.last_completed.as_deref().unwrap_or("(none)"),
            self.error.kind(),
            self.error,
        );
        for line in self.state.log() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Executes validated workflow definitions.
///
/// The engine holds no per-run state; one instance can serve any number of
/// concurrent runs against shared definitions.
#[derive(Default)]
pub struct Engine {
    stage_timeout: Option<Duration>,
    events: Option<Arc<EventBus>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            stage_timeout: config.stage_timeout(),
            events: None,
        }
    }

    /// Abort any stage that runs longer than `timeout`.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Publish run events to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Run `definition` from its entry node until the terminal marker.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        initial: WorkflowState,
        capabilities: &dyn CapabilityProvider,
    ) -> Result<ExecutionResult, RunFailure> {
        self.run_with_id(RunId::new(), definition, initial, capabilities)
            .await
    }

    /// Like [`Engine::run`], under a caller-chosen run id (so a log
    /// subscriber can be attached before the run starts).
    pub async fn run_with_id(
        &self,
        run_id: RunId,
        definition: &WorkflowDefinition,
        initial: WorkflowState,
        capabilities: &dyn CapabilityProvider,
    ) -> Result<ExecutionResult, RunFailure> {
        let start = Instant::now();
        let mut run = RunProgress {
            run_id,
            stage_results: Vec::new(),
            last_completed: None,
        };
        let mut state = initial;
        let mut current = definition.entry().to_string();

        info!(run_id = %run.run_id, ticket_id = %state.ticket().ticket_id, "Workflow run started");
        self.publish(WorkflowEvent::RunStarted {
            run_id: run.run_id.clone(),
            ticket_id: state.ticket().ticket_id.clone(),
        });

        loop {
            let stage = match definition.stage(&current) {
                Some(s) => Arc::clone(s),
                None => {
                    let err = TicketflowError::Configuration(format!(
                        "node '{}' not found in definition",
                        current
                    ));
                    return Err(self.fail(run, current, err, state));
                }
            };

            if let Some(field) = state.first_missing(stage.requires()) {
                let err = TicketflowError::Precondition {
                    stage: current.clone(),
                    field: field.to_string(),
                };
                return Err(self.fail(run, current, err, state));
            }

            info!(stage = %current, "Executing stage");
            self.publish(WorkflowEvent::StageStarted {
                run_id: run.run_id.clone(),
                stage: current.clone(),
            });

            let snapshot = state.clone();
            let stage_start = Instant::now();
            let fut = stage.run(state, capabilities);
            let outcome = match self.stage_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(TicketflowError::StageTimeout {
                        scope: format!("stage {}", current),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
                None => fut.await,
            };
            let elapsed_ms = stage_start.elapsed().as_millis() as u64;

            state = match outcome {
                Ok(next) => next,
                Err(e) => {
                    let err = e.in_stage(&current);
                    return Err(self.fail(run, current, err, snapshot));
                }
            };

            if let Some(detail) = tampering(&snapshot, &state) {
                let err = TicketflowError::StateViolation {
                    stage: current.clone(),
                    detail,
                };
                return Err(self.fail(run, current, err, snapshot));
            }

            debug!(stage = %current, elapsed_ms, "Stage complete");
            self.publish(WorkflowEvent::StageCompleted {
                run_id: run.run_id.clone(),
                stage: current.clone(),
                elapsed_ms,
                log_len: state.log().len(),
            });
            run.last_completed = Some(current.clone());

            let (label, next) = match definition.outgoing(&current) {
                Some(Outgoing::Static(target)) => (None, target.clone()),
                Some(Outgoing::Conditional(table)) => match table.resolve(&state) {
                    (label, Some(target)) => {
                        debug!(from = %current, label, to = %target, "Route selected");
                        self.publish(WorkflowEvent::RouteSelected {
                            run_id: run.run_id.clone(),
                            from: current.clone(),
                            label: label.to_string(),
                            to: target.to_string(),
                        });
                        (Some(label.to_string()), target.clone())
                    }
                    (label, None) => {
                        let err = TicketflowError::UnhandledRouteLabel {
                            node: current.clone(),
                            label: label.to_string(),
                        };
                        return Err(self.fail(run, current, err, state));
                    }
                },
                None => {
                    let err = TicketflowError::Configuration(format!(
                        "node '{}' has no outgoing edge",
                        current
                    ));
                    return Err(self.fail(run, current, err, state));
                }
            };

            run.stage_results.push(StageRecord {
                stage: current,
                label,
                next: next.clone(),
                elapsed_ms,
            });

            match next {
                Target::End => break,
                Target::Node(name) => current = name,
            }
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run.run_id,
            stages = run.stage_results.len(),
            final_status = ?state.final_status(),
            total_elapsed_ms,
            "Workflow run complete"
        );
        self.publish(WorkflowEvent::RunCompleted {
            run_id: run.run_id.clone(),
            final_status: state.final_status(),
            total_elapsed_ms,
            state: Box::new(state.clone()),
        });

        Ok(ExecutionResult {
            run_id: run.run_id,
            state,
            stage_results: run.stage_results,
            total_elapsed_ms,
        })
    }

    fn fail(
        &self,
        run: RunProgress,
        stage: String,
        error: TicketflowError,
        mut state: WorkflowState,
    ) -> RunFailure {
        error!(run_id = %run.run_id, stage = %stage, kind = error.kind(), error = %error, "Workflow run failed");
        state.append_log(format!("FAILED: {} - {}", stage, error));
        self.publish(WorkflowEvent::RunFailed {
            run_id: run.run_id.clone(),
            last_completed: run.last_completed.clone(),
            kind: error.kind().to_string(),
            error: error.to_string(),
            log: state.log().to_vec(),
        });
        RunFailure {
            run_id: run.run_id,
            error,
            failed_stage: stage,
            last_completed: run.last_completed,
            state,
            stage_results: run.stage_results,
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

struct RunProgress {
    run_id: RunId,
    stage_results: Vec<StageRecord>,
    last_completed: Option<String>,
}

/// Detect a stage that replaced the state instead of advancing it: the
/// ticket identity must be unchanged, every field already written must
/// keep its value and the old log must be a prefix of the new one.
fn tampering(before: &WorkflowState, after: &WorkflowState) -> Option<String> {
    if before.ticket() != after.ticket() {
        return Some("ticket identity was modified".to_string());
    }
    let rewritten = [
        (
            StateField::StructuredData,
            changed(before.structured_data(), after.structured_data()),
        ),
        (
            StateField::EnrichedData,
            changed(before.enriched_data(), after.enriched_data()),
        ),
        (
            StateField::RetrievedKbArticle,
            changed(before.retrieved_kb_article(), after.retrieved_kb_article()),
        ),
        (StateField::Decision, changed(before.decision(), after.decision())),
        (
            StateField::FinalResponse,
            changed(before.final_response(), after.final_response()),
        ),
        (
            StateField::FinalStatus,
            changed(before.final_status(), after.final_status()),
        ),
    ];
    if let Some((field, _)) = rewritten.iter().find(|(_, hit)| *hit) {
        return Some(format!("{} was rewritten", field));
    }
    let old = before.log();
    let new = after.log();
    if new.len() < old.len() || new[..old.len()] != *old {
        return Some("log entries were removed or reordered".to_string());
    }
    None
}

/// A written field may not be cleared or replaced.
fn changed<T: PartialEq>(before: Option<T>, after: Option<T>) -> bool {
    before.is_some() && before != after
}
