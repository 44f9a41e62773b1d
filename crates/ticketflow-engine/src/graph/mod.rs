//! Stage graph: a validated DAG of stages with static and routed edges.
//!
//! A workflow is assembled with `WorkflowBuilder` (stages, static edges,
//! conditional edge tables, entry node) and validated once by `build()`,
//! producing an immutable `WorkflowDefinition`. The `Engine` walks a
//! definition from its entry node, running each stage and following the
//! node's single outgoing configuration until the terminal marker.

pub mod definition;
pub mod edge;
pub mod executor;

pub use definition::{EdgeView, Outgoing, WorkflowBuilder, WorkflowDefinition};
pub use edge::{ConditionalEdges, Edge, RouteLabel, Router, Target, END};
pub use executor::{Engine, ExecutionResult, RunFailure, StageRecord};
