use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use ticketflow_core::error::Result;
use ticketflow_core::traits::{invoke_as, CapabilityProvider, Stage};
use ticketflow_core::types::ops;
use ticketflow_core::{KbArticle, StateField, WorkflowState};

use super::{enter, RETRIEVE};

#[derive(Deserialize)]
struct SearchResult {
    retrieved_kb_article: KbArticle,
}

/// Searches the knowledge base with the extracted entities. An empty
/// article is stored as-is and means "no match".
pub struct Retrieve;

impl Stage for Retrieve {
    fn name(&self) -> &str {
        RETRIEVE
    }

    fn requires(&self) -> &[StateField] {
        &[StateField::ExtractedEntities]
    }

    fn run<'a>(
        &'a self,
        mut state: WorkflowState,
        capabilities: &'a dyn CapabilityProvider,
    ) -> BoxFuture<'a, Result<WorkflowState>> {
        Box::pin(async move {
            enter(&mut state, RETRIEVE);
            let entities = state
                .structured_data()
                .map(|d| d.extracted_entities.clone())
                .unwrap_or_default();

            let found: SearchResult = invoke_as(
                capabilities,
                ops::KNOWLEDGE_BASE_SEARCH,
                json!({ "entities": entities }),
            )
            .await?;

            debug!(article = %found.retrieved_kb_article.id, empty = found.retrieved_kb_article.is_empty(), "Knowledge base searched");
            state.set_retrieved_kb_article(found.retrieved_kb_article)?;
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::{StructuredData, TicketflowError};
    use ticketflow_test_utils::{ticket_without_entities, ScriptedProvider};

    #[tokio::test]
    async fn test_empty_article_is_stored() {
        let provider = ScriptedProvider::new()
            .reply(ops::KNOWLEDGE_BASE_SEARCH, json!({ "retrieved_kb_article": {} }));
        let mut state = WorkflowState::new(ticket_without_entities());
        state
            .set_structured_data(StructuredData {
                intent: "general_inquiry".into(),
                structured_query: "invoice".into(),
                extracted_entities: vec![],
            })
            .unwrap();

        let state = Retrieve.run(state, &provider).await.unwrap();

        let article = state.retrieved_kb_article().unwrap();
        assert!(article.is_empty());
        assert_eq!(
            provider.args_of(ops::KNOWLEDGE_BASE_SEARCH).unwrap(),
            json!({ "entities": [] })
        );
    }

    #[tokio::test]
    async fn test_result_without_article_key_is_capability_error() {
        let provider = ScriptedProvider::new()
            .reply(ops::KNOWLEDGE_BASE_SEARCH, json!({ "unrelated": true }));
        let mut state = WorkflowState::new(ticket_without_entities());
        state
            .set_structured_data(StructuredData {
                intent: "general_inquiry".into(),
                structured_query: "invoice".into(),
                extracted_entities: vec![],
            })
            .unwrap();

        let err = Retrieve.run(state, &provider).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Capability { ref operation, .. } if operation == ops::KNOWLEDGE_BASE_SEARCH
        ));
        assert_eq!(err.kind(), "capability_error");
    }
}
