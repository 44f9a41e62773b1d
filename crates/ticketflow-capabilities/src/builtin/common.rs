//! Computation-only capabilities. None of these perform I/O.

use futures::future::BoxFuture;
use serde::Deserialize;

use ticketflow_core::error::Result;
use ticketflow_core::traits::Capability;
use ticketflow_core::types::{ops, ProviderRole};
use ticketflow_core::KbArticle;

use super::parse_args;

pub struct ParseRequestText;

#[derive(Deserialize)]
struct QueryInput {
    query: String,
}

impl Capability for ParseRequestText {
    fn name(&self) -> &str {
        ops::PARSE_REQUEST_TEXT
    }
    fn description(&self) -> &str {
        "Classify the intent of a customer query."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::Computation
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
            let intent = if p.query.to_lowercase().contains("error code") {
                "technical_support"
            } else {
                "general_inquiry"
            };
            Ok(serde_json::json!({ "intent": intent, "structured_query": p.query }))
        })
    }
}

pub struct NormalizeFields;

#[derive(Deserialize)]
struct NormalizeInput {
    ticket_id: String,
}

impl Capability for NormalizeFields {
    fn name(&self) -> &str {
        ops::NORMALIZE_FIELDS
    }
    fn description(&self) -> &str {
        "Normalize ticket identifiers."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::Computation
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
            let p: NormalizeInput = parse_args(self.name(), args)?;
            Ok(serde_json::json!({ "normalized_ticket_id": p.ticket_id.trim().to_uppercase() }))
        })
    }
}

pub struct AddFlagsCalculations;

#[derive(Deserialize)]
struct FlagsInput {
    priority: u32,
    query: String,
}

impl Capability for AddFlagsCalculations {
    fn name(&self) -> &str {
        ops::ADD_FLAGS_CALCULATIONS
    }
    fn description(&self) -> &str {
        "Derive urgency flags and an adjusted priority."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::Computation
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "priority": { "type": "integer", "minimum": 0 },
                "query": { "type": "string" }
            },
            "required": ["priority", "query"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: FlagsInput = parse_args(self.name(), args)?;
            let is_urgent = p.query.to_lowercase().contains("urgent") || p.priority > 3;
            let calculated = if is_urgent {
                f64::from(p.priority) * 1.5
            } else {
                f64::from(p.priority)
            };
            Ok(serde_json::json!({
                "is_urgent_flag": is_urgent,
                "calculated_priority": calculated,
            }))
        })
    }
}

pub struct SolutionEvaluation;

#[derive(Deserialize)]
struct EvaluationInput {
    #[serde(default)]
    kb_article: KbArticle,
}

impl Capability for SolutionEvaluation {
    fn name(&self) -> &str {
        ops::SOLUTION_EVALUATION
    }
    fn description(&self) -> &str {
        "Score how well a knowledge-base article answers the ticket (0-100)."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::Computation
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "kb_article": { "type": "object" } },
            "required": ["kb_article"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: EvaluationInput = parse_args(self.name(), args)?;
            let score = if p.kb_article.title.to_lowercase().contains("error code") {
                95
            } else {
                75
            };
            Ok(serde_json::json!({ "solution_score": score }))
        })
    }
}

pub struct ResponseGeneration;

#[derive(Deserialize)]
struct ResponseInput {
    customer_name: String,
    query: String,
    #[serde(default)]
    kb_article: KbArticle,
}

impl Capability for ResponseGeneration {
    fn name(&self) -> &str {
        ops::RESPONSE_GENERATION
    }
    fn description(&self) -> &str {
        "Draft a customer reply citing a knowledge-base article."
    }
    fn role(&self) -> ProviderRole {
        ProviderRole::Computation
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "customer_name": { "type": "string" },
                "query": { "type": "string" },
                "kb_article": { "type": "object" }
            },
            "required": ["customer_name", "query", "kb_article"]
        })
    }
    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: ResponseInput = parse_args(self.name(), args)?;
            let excerpt: String = p.query.chars().take(30).collect();
            let response = format!(
                "Hello {},\n\n\
                 Thank you for contacting us about your query: '{}...'.\n\n\
                 Based on our knowledge base, here is a relevant article that might help: '{}'.\n\n\
                 Summary: {}\n\n\
                 Regards,\nSupport Team",
                p.customer_name, excerpt, p.kb_article.title, p.kb_article.summary
            );
            Ok(serde_json::json!({ "generated_response": response }))
        })
    }
}
