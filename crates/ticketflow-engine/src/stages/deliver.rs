use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use ticketflow_core::error::{Result, TicketflowError};
use ticketflow_core::traits::{invoke_as, CapabilityProvider, Stage};
use ticketflow_core::types::ops;
use ticketflow_core::{FinalStatus, StateField, WorkflowState};

use super::{enter, CLOSE, DO};

#[derive(Deserialize)]
struct Notification {
    notification_status: String,
}

#[derive(Deserialize)]
struct Closed {
    ticket_close_status: String,
}

/// Sends the final response to the customer.
pub struct Do;

impl Stage for Do {
    fn name(&self) -> &str {
        DO
    }

    fn requires(&self) -> &[StateField] {
        &[StateField::Email, StateField::FinalResponse]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, DO);
            let sent: Notification = invoke_as(
                capabilities,
                ops::TRIGGER_NOTIFICATIONS,
                json!({
                    "email": state.ticket().email,
                    "message": state.final_response(),
                }),
            )
            .await?;
            if sent.notification_status != "SENT" {
                return Err(TicketflowError::capability(
                    ops::TRIGGER_NOTIFICATIONS,
                    format!("notification service answered {}", sent.notification_status),
                ));
            }
            info!(email = %state.ticket().email, "Customer notified");
            Ok(state)
        })
    }
}

/// Closes a resolved ticket in the ticketing system.
pub struct Close;

impl Stage for Close {
    fn name(&self) -> &str {
        CLOSE
    }

    fn requires(&self) -> &[StateField] {
        &[StateField::TicketId, StateField::FinalStatus]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            if state.final_status() != Some(FinalStatus::Resolved) {
                return Err(TicketflowError::Precondition {
                    stage: CLOSE.to_string(),
                    field: "final_status=RESOLVED".to_string(),
                });
            }
            enter(&mut state, CLOSE);
            let closed: Closed = invoke_as(
                capabilities,
                ops::CLOSE_TICKET,
                json!({ "ticket_id": state.ticket().ticket_id }),
            )
            .await?;
            if closed.ticket_close_status != "SUCCESS" {
                return Err(TicketflowError::capability(
                    ops::CLOSE_TICKET,
                    format!("ticket system answered {}", closed.ticket_close_status),
                ));
            }
            Ok(state)
        })
    }
}
