use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{FinalStatus, WorkflowState};

/// Unique identifier of one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of provider a capability belongs to. Both roles sit behind
/// the same invocation contract; the role only records whether the
/// operation reaches an external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    /// Pure computation over its arguments.
    Computation,
    /// Talks to a CRM, knowledge base, ticketing or notification system.
    External,
}

/// Capability description, as listed by a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub name: String,
    pub description: String,
    pub role: ProviderRole,
    pub input_schema: serde_json::Value,
}

/// Operation names understood by the support workflow.
pub mod ops {
    pub const PARSE_REQUEST_TEXT: &str = "parse_request_text";
    pub const NORMALIZE_FIELDS: &str = "normalize_fields";
    pub const ADD_FLAGS_CALCULATIONS: &str = "add_flags_calculations";
    pub const SOLUTION_EVALUATION: &str = "solution_evaluation";
    pub const RESPONSE_GENERATION: &str = "response_generation";

    pub const EXTRACT_ENTITIES: &str = "extract_entities";
    pub const ENRICH_RECORDS: &str = "enrich_records";
    pub const KNOWLEDGE_BASE_SEARCH: &str = "knowledge_base_search";
    pub const ESCALATION_DECISION: &str = "escalation_decision";
    pub const UPDATE_TICKET: &str = "update_ticket";
    pub const CLOSE_TICKET: &str = "close_ticket";
    pub const TRIGGER_NOTIFICATIONS: &str = "trigger_notifications";
}

/// Engine event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Run started at the entry node.
    RunStarted { run_id: RunId, ticket_id: String },
    /// A stage passed its precondition check and is executing.
    StageStarted { run_id: RunId, stage: String },
    /// A stage returned successfully.
    StageCompleted {
        run_id: RunId,
        stage: String,
        elapsed_ms: u64,
        log_len: usize,
    },
    /// A router picked an edge.
    RouteSelected {
        run_id: RunId,
        from: String,
        label: String,
        to: String,
    },
    /// The terminal marker was reached.
    RunCompleted {
        run_id: RunId,
        final_status: Option<FinalStatus>,
        total_elapsed_ms: u64,
        state: Box<WorkflowState>,
    },
    /// The run aborted.
    RunFailed {
        run_id: RunId,
        last_completed: Option<String>,
        kind: String,
        error: String,
        log: Vec<String>,
    },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::RouteSelected { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => run_id,
        }
    }
}
