use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use ticketflow_core::error::Result;
use ticketflow_core::traits::{invoke_as, CapabilityProvider, Stage};
use ticketflow_core::types::ops;
use ticketflow_core::{StateField, StructuredData, WorkflowState};

use super::{enter, UNDERSTAND};

#[derive(Deserialize)]
struct Parsed {
    intent: String,
    structured_query: String,
}

#[derive(Deserialize)]
struct Entities {
    extracted_entities: Vec<String>,
}

/// Parses the query and extracts entities into `structured_data`.
pub struct Understand;

impl Stage for Understand {
    fn name(&self) -> &str {
        UNDERSTAND
    }

    fn requires(&self) -> &[StateField] {
        &[StateField::Query]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, UNDERSTAND);
            let query = state.ticket().query.clone();

            let parsed: Parsed =
                invoke_as(capabilities, ops::PARSE_REQUEST_TEXT, json!({ "query": query })).await?;
            let entities: Entities =
                invoke_as(capabilities, ops::EXTRACT_ENTITIES, json!({ "query": query })).await?;

            debug!(intent = %parsed.intent, entities = entities.extracted_entities.len(), "Query understood");
            state.set_structured_data(StructuredData {
                intent: parsed.intent,
                structured_query: parsed.structured_query,
                extracted_entities: entities.extracted_entities,
            })?;
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::TicketflowError;
    use ticketflow_test_utils::{sample_ticket, ScriptedProvider};

    #[tokio::test]
    async fn test_understand_writes_structured_data() {
        let provider = ScriptedProvider::support_defaults();
        let state = Understand
            .run(WorkflowState::new(sample_ticket()), &provider)
            .await
            .unwrap();

        let data = state.structured_data().unwrap();
        assert_eq!(data.intent, "technical_support");
        assert_eq!(data.extracted_entities, vec!["Pro-Widget X", "error code 42"]);
        assert_eq!(state.log(), &["STAGE: UNDERSTAND".to_string()]);
        assert_eq!(
            provider.call_names(),
            vec![ops::PARSE_REQUEST_TEXT, ops::EXTRACT_ENTITIES]
        );
        assert_eq!(
            provider.args_of(ops::EXTRACT_ENTITIES).unwrap()["query"],
            sample_ticket().query
        );
    }

    #[tokio::test]
    async fn test_malformed_entities_result() {
        let provider = ScriptedProvider::support_defaults()
            .reply(ops::EXTRACT_ENTITIES, json!({ "extracted_entities": "Pro-Widget X" }));
        let err = Understand
            .run(WorkflowState::new(sample_ticket()), &provider)
            .await
            .unwrap_err();
        assert!(
            matches!(err, TicketflowError::Capability { ref operation, .. } if operation == ops::EXTRACT_ENTITIES)
        );
    }
}
