use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use ticketflow_core::error::Result;
use ticketflow_core::traits::{invoke_as, CapabilityProvider, Stage};
use ticketflow_core::types::ops;
use ticketflow_core::{EnrichedData, StateField, WorkflowState};

use super::{enter, PREPARE};

#[derive(Deserialize)]
struct Normalized {
    normalized_ticket_id: String,
}

#[derive(Deserialize)]
struct CustomerRecord {
    customer_sla: String,
    historical_ticket_count: u32,
}

#[derive(Deserialize)]
struct Flags {
    is_urgent_flag: bool,
    calculated_priority: f64,
}

/// Normalizes the ticket id, pulls CRM data, and computes urgency flags.
pub struct Prepare;

impl Stage for Prepare {
    fn name(&self) -> &str {
        PREPARE
    }

    fn requires(&self) -> &[StateField] {
        &[
            StateField::TicketId,
            StateField::Email,
            StateField::Priority,
            StateField::Query,
        ]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, PREPARE);
            let ticket = state.ticket().clone();

            let normalized: Normalized = invoke_as(
                capabilities,
                ops::NORMALIZE_FIELDS,
                json!({ "ticket_id": ticket.ticket_id }),
            )
            .await?;
            let record: CustomerRecord = invoke_as(
                capabilities,
                ops::ENRICH_RECORDS,
                json!({ "email": ticket.email }),
            )
            .await?;
            let flags: Flags = invoke_as(
                capabilities,
                ops::ADD_FLAGS_CALCULATIONS,
                json!({ "priority": ticket.priority, "query": ticket.query }),
            )
            .await?;

            state.set_enriched_data(EnrichedData {
                normalized_ticket_id: normalized.normalized_ticket_id,
                customer_sla: record.customer_sla,
                historical_ticket_count: record.historical_ticket_count,
                is_urgent_flag: flags.is_urgent_flag,
                calculated_priority: flags.calculated_priority,
            })?;
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_test_utils::{sample_ticket, ScriptedProvider};

    #[tokio::test]
    async fn test_prepare_merges_three_results() {
        let provider = ScriptedProvider::support_defaults().reply(
            ops::ADD_FLAGS_CALCULATIONS,
            json!({ "is_urgent_flag": true, "calculated_priority": 6.0 }),
        );
        let state = Prepare
            .run(WorkflowState::new(sample_ticket()), &provider)
            .await
            .unwrap();

        let data = state.enriched_data().unwrap();
        assert_eq!(data.normalized_ticket_id, "TKT-1");
        assert_eq!(data.customer_sla, "Gold");
        assert_eq!(data.historical_ticket_count, 5);
        assert!(data.is_urgent_flag);
        assert_eq!(data.calculated_priority, 6.0);
        assert_eq!(
            provider.args_of(ops::ADD_FLAGS_CALCULATIONS).unwrap(),
            json!({ "priority": 2, "query": sample_ticket().query })
        );
    }
}
