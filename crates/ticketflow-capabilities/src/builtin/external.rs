//! Capabilities that front external systems: entity extraction service,
//! CRM, knowledge base, ticketing and notifications.
//!
//! The built-ins are in-process stand-ins with deterministic answers. A
//! deployment replaces them by registering its own implementation under
//! the same operation name.

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use ticketflow_core::error::Result;
use ticketflow_core::traits::Capability;
use ticketflow_core::types::{ops, ProviderRole};
use ticketflow_core::KbArticle;

use super::parse_args;

/// Finds product names and `error code N` mentions in a query.
pub struct ExtractEntities {
    products: Vec<String>,
    error_code: Regex,
}

impl ExtractEntities {
    pub fn new(products: Vec<String>) -> Self {
        Self {
            products,
            error_code: Regex::new(r"(?i)\berror\s+code\s+(\d+)\b").expect("static regex"),
        }
    }
}

impl Default for ExtractEntities {
    fn default() -> Self {
        Self::new(vec!["Pro-Widget X".to_string()])
    }
}

#[derive(Deserialize)]
struct QueryInput {
    query: String,
}

impl Capability for ExtractEntities {
    fn name(&self) -> &str {
        ops::EXTRACT_ENTITIES
    }
    fn description(&self) -> &str {
        "Extract product names and error codes from a query."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: QueryInput = parse_args(self.name(), args)?;
            let mut entities: Vec<String> = self
                .products
                .iter()
                .filter(|product| p.query.contains(product.as_str()))
                .cloned()
                .collect();
            for caps in self.error_code.captures_iter(&p.query) {
                let code = format!("error code {}", &caps[1]);
                if !entities.contains(&code) {
                    entities.push(code);
                }
            }
            Ok(serde_json::json!({ "extracted_entities": entities }))
        })
    }
}

pub struct EnrichRecords;

#[derive(Deserialize)]
struct EmailInput {
    email: String,
}

impl Capability for EnrichRecords {
    fn name(&self) -> &str {
        ops::ENRICH_RECORDS
    }
    fn description(&self) -> &str {
        "Look up the customer's CRM record by email."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "email": { "type": "string" } },
            "required": ["email"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: EmailInput = parse_args(self.name(), args)?;
            debug!(email = %p.email, "Looking up customer record");
            Ok(serde_json::json!({
                "customer_sla": "Gold",
                "historical_ticket_count": 5,
            }))
        })
    }
}

/// An article plus the entities that retrieve it.
#[derive(Debug, Clone)]
pub struct KbEntry {
    pub article: KbArticle,
    pub keywords: Vec<String>,
}

/// In-memory knowledge base. Returns the first article whose keyword is
/// among the requested entities, or an empty record.
pub struct KnowledgeBaseSearch {
    entries: Vec<KbEntry>,
}

impl KnowledgeBaseSearch {
    pub fn new(entries: Vec<KbEntry>) -> Self {
        Self { entries }
    }
}

impl Default for KnowledgeBaseSearch {
    fn default() -> Self {
        Self::new(vec![KbEntry {
            article: KbArticle {
                id: "KB-123".into(),
                title: "Resolving Error Code 42 on Pro-Widget X".into(),
                summary: "This error is typically caused by a firmware mismatch. \
                          To resolve, please follow the steps to update the firmware..."
                    .into(),
            },
            keywords: vec!["error code 42".into()],
        }])
    }
}

#[derive(Deserialize)]
struct SearchInput {
    #[serde(default)]
    entities: Vec<String>,
}

impl Capability for KnowledgeBaseSearch {
    fn name(&self) -> &str {
        ops::KNOWLEDGE_BASE_SEARCH
    }
    fn description(&self) -> &str {
        "Search the knowledge base for an article matching extracted entities."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "entities": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["entities"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: SearchInput = parse_args(self.name(), args)?;
            let article = self
                .entries
                .iter()
                .find(|entry| entry.keywords.iter().any(|k| p.entities.contains(k)))
                .map(|entry| entry.article.clone())
                .unwrap_or_default();
            Ok(serde_json::json!({ "retrieved_kb_article": article }))
        })
    }
}

pub struct EscalationDecision;

#[derive(Deserialize)]
struct TicketInput {
    ticket_id: String,
}

impl Capability for EscalationDecision {
    fn name(&self) -> &str {
        ops::ESCALATION_DECISION
    }
    fn description(&self) -> &str {
        "Assign an escalated ticket to a human support tier."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "ticket_id": { "type": "string" } },
            "required": ["ticket_id"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: TicketInput = parse_args(self.name(), args)?;
            info!(ticket_id = %p.ticket_id, "Ticket assigned to Tier 2 Support");
            Ok(serde_json::json!({ "escalation_status": "Assigned to Tier 2 Support" }))
        })
    }
}

pub struct UpdateTicket;

#[derive(Deserialize)]
struct UpdateInput {
    ticket_id: String,
    status: String,
    assignee: String,
}

impl Capability for UpdateTicket {
    fn name(&self) -> &str {
        ops::UPDATE_TICKET
    }
    fn description(&self) -> &str {
        "Set a ticket's status and assignee in the ticketing system."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ticket_id": { "type": "string" },
                "status": { "type": "string" },
                "assignee": { "type": "string" }
            },
            "required": ["ticket_id", "status", "assignee"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: UpdateInput = parse_args(self.name(), args)?;
            info!(ticket_id = %p.ticket_id, status = %p.status, assignee = %p.assignee, "Ticket updated");
            Ok(serde_json::json!({ "ticket_update_status": "SUCCESS" }))
        })
    }
}

pub struct CloseTicket;

impl Capability for CloseTicket {
    fn name(&self) -> &str {
        ops::CLOSE_TICKET
    }
    fn description(&self) -> &str {
        "Close a ticket in the ticketing system."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "ticket_id": { "type": "string" } },
            "required": ["ticket_id"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: TicketInput = parse_args(self.name(), args)?;
            info!(ticket_id = %p.ticket_id, "Ticket closed");
            Ok(serde_json::json!({ "ticket_close_status": "SUCCESS" }))
        })
    }
}

pub struct TriggerNotifications;

#[derive(Deserialize)]
struct NotificationInput {
    email: String,
    message: String,
}

impl Capability for TriggerNotifications {
    fn name(&self) -> &str {
        ops::TRIGGER_NOTIFICATIONS
    }
    fn description(&self) -> &str {
        "Send the customer a notification email."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::External
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": { "type": "string", "description": "Recipient address" },
                "message": { "type": "string", "description": "Notification body" }
            },
            "required": ["email", "message"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: NotificationInput = parse_args(self.name(), args)?;
            info!(email = %p.email, chars = p.message.len(), "Notification sent");
            Ok(serde_json::json!({ "notification_status": "SENT" }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ticketflow_core::TicketflowError;

    #[tokio::test]
    async fn test_extract_products_and_error_codes() {
        let out = ExtractEntities::default()
            .invoke(json!({ "query": "My Pro-Widget X shows Error Code 42, then error code 7" }))
            .await
            .unwrap();
        assert_eq!(
            out["extracted_entities"],
            json!(["Pro-Widget X", "error code 42", "error code 7"])
        );
    }

    #[tokio::test]
    async fn test_extract_nothing() {
        let out = ExtractEntities::default()
            .invoke(json!({ "query": "Where is my invoice?" }))
            .await
            .unwrap();
        assert_eq!(out["extracted_entities"], json!([]));
    }

    #[tokio::test]
    async fn test_kb_search_hit_and_miss() {
        let kb = KnowledgeBaseSearch::default();
        let out = kb
            .invoke(json!({ "entities": ["Pro-Widget X", "error code 42"] }))
            .await
            .unwrap();
        assert_eq!(out["retrieved_kb_article"]["id"], "KB-123");

        let out = kb.invoke(json!({ "entities": ["Pro-Widget X"] })).await.unwrap();
        assert_eq!(out["retrieved_kb_article"], json!({}));
    }

    #[tokio::test]
    async fn test_ticketing_acknowledgements() {
        let out = UpdateTicket
            .invoke(json!({ "ticket_id": "T-1", "status": "Escalated", "assignee": "Tier 2 Support" }))
            .await
            .unwrap();
        assert_eq!(out["ticket_update_status"], "SUCCESS");

        let out = CloseTicket.invoke(json!({ "ticket_id": "T-1" })).await.unwrap();
        assert_eq!(out["ticket_close_status"], "SUCCESS");

        let out = EscalationDecision.invoke(json!({ "ticket_id": "T-1" })).await.unwrap();
        assert_eq!(out["escalation_status"], "Assigned to Tier 2 Support");
    }

    #[tokio::test]
    async fn test_notification_requires_message() {
        let err = TriggerNotifications
            .invoke(json!({ "email": "a@example.com" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "capability_error");
    }

    #[tokio::test]
    async fn test_enrich_records_requires_email() {
        let out = EnrichRecords
            .invoke(json!({ "email": "ana@example.com" }))
            .await
            .unwrap();
        assert_eq!(out["customer_sla"], "Gold");

        let err = EnrichRecords.invoke(json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            TicketflowError::Capability { ref operation, .. } if operation == "enrich_records"
        ));
    }
}
