//! The record threaded through every stage of a workflow run.
//!
//! Each non-log field has exactly one owning stage and can be written once.
//! The log only grows. The setters below enforce both rules within one
//! state value. A stage can still hand back a different value, so the
//! engine compares each returned state against the one it passed in and
//! rejects a rewritten field or a shortened log.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TicketflowError};

/// Caller-supplied ticket identity. Immutable after intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub customer_name: String,
    pub email: String,
    pub query: String,
    pub priority: u32,
}

impl Ticket {
    pub fn new(
        ticket_id: impl Into<String>,
        customer_name: impl Into<String>,
        email: impl Into<String>,
        query: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            customer_name: customer_name.into(),
            email: email.into(),
            query: query.into(),
            priority,
        }
    }
}

/// Output of UNDERSTAND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    pub intent: String,
    pub structured_query: String,
    #[serde(default)]
    pub extracted_entities: Vec<String>,
}

/// Output of PREPARE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedData {
    pub normalized_ticket_id: String,
    pub customer_sla: String,
    pub historical_ticket_count: u32,
    pub is_urgent_flag: bool,
    pub calculated_priority: f64,
}

/// A knowledge-base article. All fields empty means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbArticle {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

impl KbArticle {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.title.is_empty() && self.summary.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    CreateResponse,
    Escalate,
}

/// Output of DECIDE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub score: u8,
    pub outcome: DecisionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalStatus {
    Resolved,
    Escalated,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// Names a field a stage may require before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    TicketId,
    CustomerName,
    Email,
    Query,
    Priority,
    StructuredData,
    ExtractedEntities,
    EnrichedData,
    RetrievedKbArticle,
    Decision,
    FinalResponse,
    FinalStatus,
}

impl StateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketId => "ticket_id",
            Self::CustomerName => "customer_name",
            Self::Email => "email",
            Self::Query => "query",
            Self::Priority => "priority",
            Self::StructuredData => "structured_data",
            Self::ExtractedEntities => "structured_data.extracted_entities",
            Self::EnrichedData => "enriched_data",
            Self::RetrievedKbArticle => "retrieved_kb_article",
            Self::Decision => "decision",
            Self::FinalResponse => "final_response",
            Self::FinalStatus => "final_status",
        }
    }
}

impl std::fmt::Display for StateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state for one workflow run.
///
/// Serializes to the flat field table used for audit records: the ticket
/// identity fields, then `log`, then every stage-owned field (null until
/// written).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(flatten)]
    ticket: Ticket,
    #[serde(default)]
    log: Vec<String>,
    #[serde(default)]
    structured_data: Option<StructuredData>,
    #[serde(default)]
    enriched_data: Option<EnrichedData>,
    #[serde(default)]
    retrieved_kb_article: Option<KbArticle>,
    #[serde(default)]
    decision: Option<Decision>,
    #[serde(default)]
    final_response: Option<String>,
    #[serde(default)]
    final_status: Option<FinalStatus>,
}

impl WorkflowState {
    /// Create the initial state for a ticket with an empty log.
    pub fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            log: Vec::new(),
            structured_data: None,
            enriched_data: None,
            retrieved_kb_article: None,
            decision: None,
            final_response: None,
            final_status: None,
        }
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Append a log entry. Entries are never removed or reordered.
    pub fn append_log(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    pub fn structured_data(&self) -> Option<&StructuredData> {
        self.structured_data.as_ref()
    }

    pub fn enriched_data(&self) -> Option<&EnrichedData> {
        self.enriched_data.as_ref()
    }

    pub fn retrieved_kb_article(&self) -> Option<&KbArticle> {
        self.retrieved_kb_article.as_ref()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn final_status(&self) -> Option<FinalStatus> {
        self.final_status
    }

    pub fn set_structured_data(&mut self, value: StructuredData) -> Result<()> {
        write_once(&mut self.structured_data, value, StateField::StructuredData)
    }

    pub fn set_enriched_data(&mut self, value: EnrichedData) -> Result<()> {
        write_once(&mut self.enriched_data, value, StateField::EnrichedData)
    }

    pub fn set_retrieved_kb_article(&mut self, value: KbArticle) -> Result<()> {
        write_once(
            &mut self.retrieved_kb_article,
            value,
            StateField::RetrievedKbArticle,
        )
    }

    pub fn set_decision(&mut self, value: Decision) -> Result<()> {
        write_once(&mut self.decision, value, StateField::Decision)
    }

    /// Record the run's outcome. Response and status are written together
    /// and only once.
    pub fn set_outcome(&mut self, response: impl Into<String>, status: FinalStatus) -> Result<()> {
        if self.final_status.is_some() {
            return Err(already_written(StateField::FinalStatus));
        }
        write_once(&mut self.final_response, response.into(), StateField::FinalResponse)?;
        self.final_status = Some(status);
        Ok(())
    }

    /// Whether `field` is populated. Ticket strings count as present when
    /// non-blank.
    pub fn has(&self, field: StateField) -> bool {
        match field {
            StateField::TicketId => !self.ticket.ticket_id.trim().is_empty(),
            StateField::CustomerName => !self.ticket.customer_name.trim().is_empty(),
            StateField::Email => !self.ticket.email.trim().is_empty(),
            StateField::Query => !self.ticket.query.trim().is_empty(),
            StateField::Priority => true,
            StateField::StructuredData | StateField::ExtractedEntities => {
                self.structured_data.is_some()
            }
            StateField::EnrichedData => self.enriched_data.is_some(),
            StateField::RetrievedKbArticle => self.retrieved_kb_article.is_some(),
            StateField::Decision => self.decision.is_some(),
            StateField::FinalResponse => self.final_response.is_some(),
            StateField::FinalStatus => self.final_status.is_some(),
        }
    }

    /// First field in `fields` that is not populated.
    pub fn first_missing(&self, fields: &[StateField]) -> Option<StateField> {
        fields.iter().copied().find(|f| !self.has(*f))
    }
}

fn write_once<T>(slot: &mut Option<T>, value: T, field: StateField) -> Result<()> {
    if slot.is_some() {
        return Err(already_written(field));
    }
    *slot = Some(value);
    Ok(())
}

fn already_written(field: StateField) -> TicketflowError {
    TicketflowError::StateViolation {
        stage: String::new(),
        detail: format!("{} was already written", field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket::new("TKT-1", "Alice", "alice@example.com", "help", 2)
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = WorkflowState::new(ticket());
        assert!(state.log().is_empty());
        assert!(state.structured_data().is_none());
        assert!(state.final_status().is_none());
        assert!(state.has(StateField::TicketId));
        assert!(!state.has(StateField::Decision));
    }

    #[test]
    fn test_blank_ticket_fields_are_missing() {
        let state = WorkflowState::new(Ticket::new("  ", "Alice", "", "q", 1));
        assert_eq!(
            state.first_missing(&[StateField::Query, StateField::TicketId, StateField::Email]),
            Some(StateField::TicketId)
        );
    }

    #[test]
    fn test_fields_are_write_once() {
        let mut state = WorkflowState::new(ticket());
        state.set_retrieved_kb_article(KbArticle::default()).unwrap();
        let err = state
            .set_retrieved_kb_article(KbArticle {
                id: "KB-1".into(),
                title: "t".into(),
                summary: "s".into(),
            })
            .unwrap_err();
        assert!(matches!(err, TicketflowError::StateViolation { .. }));
        assert!(state.retrieved_kb_article().unwrap().is_empty());
    }

    #[test]
    fn test_outcome_set_exactly_once() {
        let mut state = WorkflowState::new(ticket());
        state.set_outcome("done", FinalStatus::Resolved).unwrap();
        assert!(state.set_outcome("again", FinalStatus::Escalated).is_err());
        assert_eq!(state.final_status(), Some(FinalStatus::Resolved));
        assert_eq!(state.final_response(), Some("done"));
    }

    #[test]
    fn test_serializes_flat_field_table() {
        let mut state = WorkflowState::new(ticket());
        state.append_log("STAGE: INTAKE");
        state.set_retrieved_kb_article(KbArticle::default()).unwrap();
        state
            .set_decision(Decision {
                score: 75,
                outcome: DecisionOutcome::Escalate,
                escalation_status: Some("Assigned to Tier 2 Support".into()),
            })
            .unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["ticket_id"], "TKT-1");
        assert_eq!(json["log"][0], "STAGE: INTAKE");
        assert_eq!(json["retrieved_kb_article"], serde_json::json!({}));
        assert_eq!(json["decision"]["outcome"], "ESCALATE");
        assert!(json["final_status"].is_null());

        let parsed: WorkflowState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }
}
