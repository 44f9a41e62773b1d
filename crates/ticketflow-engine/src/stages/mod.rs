//! The support-ticket workflow: ten stages wired into one graph.
//!
//! ```text
//! INTAKE → UNDERSTAND → PREPARE → RETRIEVE → DECIDE ─┬─ CREATE ─┬─ DO ─┬─ CLOSE → COMPLETE → end
//!                                                    └─ UPDATE ─┘      └─ end
//! ```

pub mod decide;
pub mod deliver;
pub mod intake;
pub mod prepare;
pub mod respond;
pub mod retrieve;
pub mod understand;

use ticketflow_core::error::Result;
use ticketflow_core::WorkflowState;

use crate::graph::{Target, WorkflowBuilder, WorkflowDefinition};
use crate::routing::{CompletionRoute, CompletionRouter, DecisionRoute, DecisionRouter};

pub use decide::{outcome_for, Decide, RESOLUTION_THRESHOLD};
pub use deliver::{Close, Do};
pub use intake::{Complete, Intake};
pub use prepare::Prepare;
pub use respond::{Create, Update, ESCALATION_RESPONSE};
pub use retrieve::Retrieve;
pub use understand::Understand;

pub const INTAKE: &str = "INTAKE";
pub const UNDERSTAND: &str = "UNDERSTAND";
pub const PREPARE: &str = "PREPARE";
pub const RETRIEVE: &str = "RETRIEVE";
pub const DECIDE: &str = "DECIDE";
pub const CREATE: &str = "CREATE";
pub const UPDATE: &str = "UPDATE";
pub const DO: &str = "DO";
pub const CLOSE: &str = "CLOSE";
pub const COMPLETE: &str = "COMPLETE";

const STAGE_PREFIX: &str = "STAGE: ";

/// Build and validate the support workflow.
pub fn support_workflow() -> Result<WorkflowDefinition> {
    WorkflowBuilder::new()
        .add_stage(Intake)
        .add_stage(Understand)
        .add_stage(Prepare)
        .add_stage(Retrieve)
        .add_stage(Decide)
        .add_stage(Create)
        .add_stage(Update)
        .add_stage(Do)
        .add_stage(Close)
        .add_stage(Complete)
        .set_entry(INTAKE)
        .add_edge(INTAKE, Target::node(UNDERSTAND))
        .add_edge(UNDERSTAND, Target::node(PREPARE))
        .add_edge(PREPARE, Target::node(RETRIEVE))
        .add_edge(RETRIEVE, Target::node(DECIDE))
        .add_conditional_edges(
            DECIDE,
            DecisionRouter,
            [
                (DecisionRoute::Create, Target::node(CREATE)),
                (DecisionRoute::Update, Target::node(UPDATE)),
            ],
        )
        .add_edge(CREATE, Target::node(DO))
        .add_edge(UPDATE, Target::node(DO))
        .add_conditional_edges(
            DO,
            CompletionRouter,
            [
                (CompletionRoute::Close, Target::node(CLOSE)),
                (CompletionRoute::End, Target::End),
            ],
        )
        .add_edge(CLOSE, Target::node(COMPLETE))
        .add_edge(COMPLETE, Target::End)
        .build()
}

/// Stage names recorded in a run log, in order.
pub fn logged_stages(log: &[String]) -> Vec<&str> {
    log.iter()
        .filter_map(|line| line.strip_prefix(STAGE_PREFIX))
        .map(|rest| rest.split(' ').next().unwrap_or(rest))
        .collect()
}

/// Append the entry marker every stage writes first.
fn enter(state: &mut WorkflowState, stage: &str) {
    state.append_log(format!("{}{}", STAGE_PREFIX, stage));
}
