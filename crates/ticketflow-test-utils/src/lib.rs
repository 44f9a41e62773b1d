//! Deterministic capability provider and ticket fixtures for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use ticketflow_core::error::{Result, TicketflowError};
use ticketflow_core::traits::CapabilityProvider;
use ticketflow_core::types::ops;
use ticketflow_core::Ticket;

#[derive(Clone)]
enum Script {
    Reply(Value),
    Fail(String),
}

/// A provider that answers from canned replies and records every call.
///
/// Unscripted operations fail with a capability error, so a test only
/// passes if it scripts everything the code under test invokes.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: HashMap<String, Script>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies for all twelve support operations, matching a ticket that
    /// mentions "error code 42" and resolves with a score of 95.
    pub fn support_defaults() -> Self {
        Self::new()
            .reply(
                ops::PARSE_REQUEST_TEXT,
                json!({ "intent": "technical_support", "structured_query": "error code 42" }),
            )
            .reply(
                ops::EXTRACT_ENTITIES,
                json!({ "extracted_entities": ["Pro-Widget X", "error code 42"] }),
            )
            .reply(ops::NORMALIZE_FIELDS, json!({ "normalized_ticket_id": "TKT-1" }))
            .reply(
                ops::ENRICH_RECORDS,
                json!({ "customer_sla": "Gold", "historical_ticket_count": 5 }),
            )
            .reply(
                ops::ADD_FLAGS_CALCULATIONS,
                json!({ "is_urgent_flag": false, "calculated_priority": 2.0 }),
            )
            .reply(
                ops::KNOWLEDGE_BASE_SEARCH,
                json!({ "retrieved_kb_article": sample_article() }),
            )
            .with_score(95)
            .reply(
                ops::ESCALATION_DECISION,
                json!({ "escalation_status": "Assigned to Tier 2 Support" }),
            )
            .reply(
                ops::RESPONSE_GENERATION,
                json!({ "generated_response": "Hello Ana, see 'Resolving Error Code 42 on Pro-Widget X'." }),
            )
            .reply(ops::UPDATE_TICKET, json!({ "ticket_update_status": "SUCCESS" }))
            .reply(ops::CLOSE_TICKET, json!({ "ticket_close_status": "SUCCESS" }))
            .reply(ops::TRIGGER_NOTIFICATIONS, json!({ "notification_status": "SENT" }))
    }

    /// Answer `operation` with `result`.
    pub fn reply(mut self, operation: &str, result: Value) -> Self {
        self.scripts.insert(operation.to_string(), Script::Reply(result));
        self
    }

    /// Fail `operation` with a capability error carrying `cause`.
    pub fn fail(mut self, operation: &str, cause: &str) -> Self {
        self.scripts
            .insert(operation.to_string(), Script::Fail(cause.to_string()));
        self
    }

    /// Sleep before answering `operation`.
    pub fn delay(mut self, operation: &str, duration: Duration) -> Self {
        self.delays.insert(operation.to_string(), duration);
        self
    }

    /// Script the solution score.
    pub fn with_score(self, score: i64) -> Self {
        self.reply(ops::SOLUTION_EVALUATION, json!({ "solution_score": score }))
    }

    /// Every call so far, in order, with its arguments.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Operation names called so far, in order.
    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.call_names().iter().any(|n| n == operation)
    }

    /// Arguments of the first call to `operation`.
    pub fn args_of(&self, operation: &str) -> Option<Value> {
        self.calls()
            .into_iter()
            .find(|(name, _)| name == operation)
            .map(|(_, args)| args)
    }
}

impl CapabilityProvider for ScriptedProvider {
    fn invoke<'a>(&'a self, operation: &'a str, args: Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((operation.to_string(), args));
            }
            if let Some(delay) = self.delays.get(operation) {
                tokio::time::sleep(*delay).await;
            }
            match self.scripts.get(operation) {
                Some(Script::Reply(value)) => Ok(value.clone()),
                Some(Script::Fail(cause)) => Err(TicketflowError::capability(operation, cause)),
                None => Err(TicketflowError::capability(operation, "not scripted")),
            }
        })
    }
}

/// The article the stand-in knowledge base holds for "error code 42".
pub fn sample_article() -> Value {
    json!({
        "id": "KB-123",
        "title": "Resolving Error Code 42 on Pro-Widget X",
        "summary": "This error is typically caused by a firmware mismatch."
    })
}

/// A ticket about a known error code.
pub fn sample_ticket() -> Ticket {
    Ticket::new(
        "tkt-78901",
        "Ana",
        "ana@example.com",
        "My Pro-Widget X is showing error code 42 and I can't get it to work.",
        2,
    )
}

/// A ticket with nothing an entity extractor would recognise.
pub fn ticket_without_entities() -> Ticket {
    Ticket::new(
        "tkt-10002",
        "Ben",
        "ben@example.com",
        "Where can I download my invoice?",
        1,
    )
}
