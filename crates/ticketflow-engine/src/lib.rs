pub mod graph;
pub mod routing;
pub mod run_log;
pub mod stages;

pub use graph::{
    ConditionalEdges, Engine, ExecutionResult, RunFailure, Target, WorkflowBuilder,
    WorkflowDefinition, END,
};
pub use run_log::RunLogger;
pub use stages::support_workflow;
