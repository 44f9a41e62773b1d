use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use ticketflow_core::error::{Result, TicketflowError};
use ticketflow_core::traits::{invoke_as, CapabilityProvider, Stage};
use ticketflow_core::types::ops;
use ticketflow_core::{FinalStatus, StateField, WorkflowState};

use super::{enter, CREATE, UPDATE};

/// Response recorded for every escalated ticket.
pub const ESCALATION_RESPONSE: &str = "This ticket has been escalated for human review.";

const ESCALATED_STATUS: &str = "Escalated";
const ESCALATION_ASSIGNEE: &str = "Tier 2 Support";

#[derive(Deserialize)]
struct Generated {
    generated_response: String,
}

#[derive(Deserialize)]
struct TicketUpdate {
    ticket_update_status: String,
}

/// Drafts the customer reply and resolves the ticket.
pub struct Create;

impl Stage for Create {
    fn name(&self) -> &str {
        CREATE
    }

    fn requires(&self) -> &[StateField] {
        &[
            StateField::CustomerName,
            StateField::Query,
            StateField::RetrievedKbArticle,
        ]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, CREATE);
            let generated: Generated = invoke_as(
                capabilities,
                ops::RESPONSE_GENERATION,
                json!({
                    "customer_name": state.ticket().customer_name,
                    "query": state.ticket().query,
                    "kb_article": state.retrieved_kb_article(),
                }),
            )
            .await?;

            state.set_outcome(generated.generated_response, FinalStatus::Resolved)?;
            Ok(state)
        })
    }
}

/// Marks the ticket escalated in the ticketing system.
pub struct Update;

impl Stage for Update {
    fn name(&self) -> &str {
        UPDATE
    }

    fn requires(&self) -> &[StateField] {
        &[StateField::TicketId]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, UPDATE);
            let update: TicketUpdate = invoke_as(
                capabilities,
                ops::UPDATE_TICKET,
                json!({
                    "ticket_id": state.ticket().ticket_id,
                    "status": ESCALATED_STATUS,
                    "assignee": ESCALATION_ASSIGNEE,
                }),
            )
            .await?;
            if update.ticket_update_status != "SUCCESS" {
                return Err(TicketflowError::capability(
                    ops::UPDATE_TICKET,
                    format!("ticket system answered {}", update.ticket_update_status),
                ));
            }

            state.set_outcome(ESCALATION_RESPONSE, FinalStatus::Escalated)?;
            Ok(state)
        })
    }
}
