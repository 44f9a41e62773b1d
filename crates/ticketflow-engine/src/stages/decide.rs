use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use ticketflow_core::error::{Result, TicketflowError};
use ticketflow_core::traits::{invoke_as, CapabilityProvider, Stage};
use ticketflow_core::types::ops;
use ticketflow_core::{Decision, DecisionOutcome, StateField, WorkflowState};

use super::{enter, DECIDE};

/// Lowest score that resolves a ticket without escalation.
pub const RESOLUTION_THRESHOLD: u8 = 90;

/// Outcome for a solution score. The threshold is inclusive.
pub fn outcome_for(score: u8) -> DecisionOutcome {
    if score >= RESOLUTION_THRESHOLD {
        DecisionOutcome::CreateResponse
    } else {
        DecisionOutcome::Escalate
    }
}

#[derive(Deserialize)]
struct Evaluation {
    solution_score: i64,
}

#[derive(Deserialize)]
struct Escalation {
    escalation_status: String,
}

/// Scores the retrieved article and decides between resolving and
/// escalating. Escalation also asks for an assignment.
pub struct Decide;

impl Stage for Decide {
    fn name(&self) -> &str {
        DECIDE
    }

    fn requires(&self) -> &[StateField] {
        &[StateField::RetrievedKbArticle]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, DECIDE);
            let article = state.retrieved_kb_article().cloned().unwrap_or_default();

            let evaluation: Evaluation = invoke_as(
                capabilities,
                ops::SOLUTION_EVALUATION,
                json!({ "kb_article": article }),
            )
            .await?;
            let score = u8::try_from(evaluation.solution_score)
                .ok()
                .filter(|s| *s <= 100)
                .ok_or_else(|| {
                    TicketflowError::capability(
                        ops::SOLUTION_EVALUATION,
                        format!("score {} outside 0..=100", evaluation.solution_score),
                    )
                })?;

            let outcome = outcome_for(score);
            let (decision, reason) = match outcome {
                DecisionOutcome::CreateResponse => (
                    Decision {
                        score,
                        outcome,
                        escalation_status: None,
                    },
                    "Sufficient solution found. Proceed to create response.",
                ),
                DecisionOutcome::Escalate => {
                    let escalation: Escalation = invoke_as(
                        capabilities,
                        ops::ESCALATION_DECISION,
                        json!({ "ticket_id": state.ticket().ticket_id }),
                    )
                    .await?;
                    (
                        Decision {
                            score,
                            outcome,
                            escalation_status: Some(escalation.escalation_status),
                        },
                        "Solution score is low. Escalating to human agent.",
                    )
                }
            };

            info!(score, outcome = ?outcome, "Decision made");
            state.set_decision(decision)?;
            state.append_log(format!("  Decision Logic: Score is {}. {}", score, reason));
            Ok(state)
        })
    }
}
