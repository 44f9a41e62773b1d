//! Branch-point routers for the support workflow.

use ticketflow_core::{DecisionOutcome, FinalStatus, WorkflowState};

use crate::graph::{RouteLabel, Router, END};

/// Labels produced after DECIDE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionRoute {
    Create,
    Update,
}

impl RouteLabel for DecisionRoute {
    fn all() -> &'static [Self] {
        &[DecisionRoute::Create, DecisionRoute::Update]
    }

    fn as_str(&self) -> &'static str {
        match self {
            DecisionRoute::Create => "CREATE",
            DecisionRoute::Update => "UPDATE",
        }
    }
}

/// Sends resolvable tickets to CREATE and everything else to UPDATE.
pub struct DecisionRouter;

impl Router for DecisionRouter {
    type Label = DecisionRoute;

    fn name(&self) -> &str {
        "route_after_decision"
    }

    fn route(&self, state: &WorkflowState) -> DecisionRoute {
        match state.decision().map(|d| d.outcome) {
            Some(DecisionOutcome::CreateResponse) => DecisionRoute::Create,
            Some(DecisionOutcome::Escalate) => DecisionRoute::Update,
            // No decision recorded: fail toward human review.
            None => DecisionRoute::Update,
        }
    }
}

/// Labels produced after DO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionRoute {
    Close,
    End,
}

impl RouteLabel for CompletionRoute {
    fn all() -> &'static [Self] {
        &[CompletionRoute::Close, CompletionRoute::End]
    }

    fn as_str(&self) -> &'static str {
        match self {
            CompletionRoute::Close => "CLOSE",
            CompletionRoute::End => END,
        }
    }
}

/// Closes resolved tickets; escalated tickets stay open.
pub struct CompletionRouter;

impl Router for CompletionRouter {
    type Label = CompletionRoute;

    fn name(&self) -> &str {
        "route_after_do"
    }

    fn route(&self, state: &WorkflowState) -> CompletionRoute {
        match state.final_status() {
            Some(FinalStatus::Resolved) => CompletionRoute::Close,
            Some(FinalStatus::Escalated) | None => CompletionRoute::End,
        }
    }
}
