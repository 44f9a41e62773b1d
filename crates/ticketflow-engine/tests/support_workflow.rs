use std::sync::Arc;

use ticketflow_capabilities::CapabilityRegistry;
use ticketflow_core::types::{ops, WorkflowEvent};
use ticketflow_core::{DecisionOutcome, EventBus, FinalStatus, WorkflowState};
use ticketflow_engine::stages::{self, logged_stages};
use ticketflow_engine::{support_workflow, Engine};
use ticketflow_test_utils::{sample_ticket, ticket_without_entities, ScriptedProvider};

const RESOLVE_PATH: [&str; 9] = [
    "INTAKE",
    "UNDERSTAND",
    "PREPARE",
    "RETRIEVE",
    "DECIDE",
    "CREATE",
    "DO",
    "CLOSE",
    "COMPLETE",
];

const ESCALATE_PATH: [&str; 7] = [
    "INTAKE",
    "UNDERSTAND",
    "PREPARE",
    "RETRIEVE",
    "DECIDE",
    "UPDATE",
    "DO",
];

#[tokio::test]
async fn test_resolve_path() {
    let definition = support_workflow().unwrap();
    let provider = ScriptedProvider::support_defaults().with_score(95);

    let result = Engine::new()
        .run(&definition, WorkflowState::new(sample_ticket()), &provider)
        .await
        .unwrap();

    let state = &result.state;
    assert_eq!(state.final_status(), Some(FinalStatus::Resolved));
    assert!(state
        .final_response()
        .unwrap()
        .contains("Resolving Error Code 42 on Pro-Widget X"));
    assert_eq!(logged_stages(result.log()), RESOLVE_PATH);
    assert_eq!(result.path(), RESOLVE_PATH);
    assert!(provider.called(ops::CLOSE_TICKET));
    assert!(!provider.called(ops::ESCALATION_DECISION));
    assert!(!provider.called(ops::UPDATE_TICKET));
}

#[tokio::test]
async fn test_escalate_path() {
    let definition = support_workflow().unwrap();
    let provider = ScriptedProvider::support_defaults().with_score(75);

    let result = Engine::new()
        .run(&definition, WorkflowState::new(sample_ticket()), &provider)
        .await
        .unwrap();

    let state = &result.state;
    assert_eq!(state.final_status(), Some(FinalStatus::Escalated));
    assert_eq!(
        state.final_response(),
        Some(stages::ESCALATION_RESPONSE)
    );
    let decision = state.decision().unwrap();
    assert_eq!(decision.outcome, DecisionOutcome::Escalate);
    assert!(decision.escalation_status.is_some());

    assert_eq!(logged_stages(result.log()), ESCALATE_PATH);
    assert!(!provider.called(ops::CLOSE_TICKET));
    assert!(!provider.called(ops::RESPONSE_GENERATION));

    let last = result.stage_results.last().unwrap();
    assert_eq!(last.stage, "DO");
    assert_eq!(last.label.as_deref(), Some("__end__"));
}

#[tokio::test]
async fn test_no_match_escalates_with_builtin_capabilities() {
    let definition = support_workflow().unwrap();
    let registry = CapabilityRegistry::with_builtins();

    let result = Engine::new()
        .run(
            &definition,
            WorkflowState::new(ticket_without_entities()),
            &registry,
        )
        .await
        .unwrap();

    let state = &result.state;
    assert!(state.structured_data().unwrap().extracted_entities.is_empty());
    assert!(state.retrieved_kb_article().unwrap().is_empty());
    let decision = state.decision().unwrap();
    assert!(decision.score < stages::RESOLUTION_THRESHOLD);
    assert_eq!(state.final_status(), Some(FinalStatus::Escalated));
    assert_eq!(logged_stages(result.log()), ESCALATE_PATH);
}

#[tokio::test]
async fn test_known_error_code_resolves_with_builtin_capabilities() {
    let definition = support_workflow().unwrap();
    let registry = CapabilityRegistry::with_builtins();

    let result = Engine::new()
        .run(&definition, WorkflowState::new(sample_ticket()), &registry)
        .await
        .unwrap();

    let state = &result.state;
    assert_eq!(state.decision().unwrap().score, 95);
    assert_eq!(state.retrieved_kb_article().unwrap().id, "KB-123");
    assert_eq!(state.enriched_data().unwrap().normalized_ticket_id, "TKT-78901");
    assert!(state
        .final_response()
        .unwrap()
        .starts_with("Hello Ana,"));
    assert_eq!(logged_stages(result.log()), RESOLVE_PATH);
}

#[tokio::test]
async fn test_score_of_exactly_ninety_resolves() {
    let definition = support_workflow().unwrap();
    let provider = ScriptedProvider::support_defaults().with_score(90);

    let result = Engine::new()
        .run(&definition, WorkflowState::new(sample_ticket()), &provider)
        .await
        .unwrap();

    assert_eq!(
        result.state.decision().unwrap().outcome,
        DecisionOutcome::CreateResponse
    );
    assert_eq!(result.state.final_status(), Some(FinalStatus::Resolved));

    let provider = ScriptedProvider::support_defaults().with_score(89);
    let result = Engine::new()
        .run(&definition, WorkflowState::new(sample_ticket()), &provider)
        .await
        .unwrap();
    assert_eq!(result.state.final_status(), Some(FinalStatus::Escalated));
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let definition = support_workflow().unwrap();
    let registry = CapabilityRegistry::with_builtins();
    let engine = Engine::new();

    let first = engine
        .run(&definition, WorkflowState::new(sample_ticket()), &registry)
        .await
        .unwrap();
    let second = engine
        .run(&definition, WorkflowState::new(sample_ticket()), &registry)
        .await
        .unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.state, second.state);
    assert_eq!(first.log(), second.log());
}

#[tokio::test]
async fn test_log_only_grows() {
    let definition = support_workflow().unwrap();
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let provider = ScriptedProvider::support_defaults();

    let result = Engine::new()
        .with_event_bus(bus.clone())
        .run(&definition, WorkflowState::new(sample_ticket()), &provider)
        .await
        .unwrap();

    let mut lengths = Vec::new();
    let mut routes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            WorkflowEvent::StageCompleted { log_len, .. } => lengths.push(log_len),
            WorkflowEvent::RouteSelected { from, label, .. } => routes.push((from, label)),
            _ => {}
        }
    }

    assert_eq!(lengths.len(), RESOLVE_PATH.len());
    assert!(lengths.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*lengths.last().unwrap(), result.log().len());
    assert_eq!(
        routes,
        vec![
            ("DECIDE".to_string(), "CREATE".to_string()),
            ("DO".to_string(), "CLOSE".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_share_one_definition() {
    let definition = Arc::new(support_workflow().unwrap());
    let engine = Arc::new(Engine::new());
    let registry = Arc::new(CapabilityRegistry::with_builtins());

    let mut handles = Vec::new();
    for i in 0..8 {
        let definition = definition.clone();
        let engine = engine.clone();
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let ticket = if i % 2 == 0 {
                sample_ticket()
            } else {
                ticket_without_entities()
            };
            engine
                .run(&definition, WorkflowState::new(ticket), registry.as_ref())
                .await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        let expected = if i % 2 == 0 {
            FinalStatus::Resolved
        } else {
            FinalStatus::Escalated
        };
        assert_eq!(result.state.final_status(), Some(expected));
    }
}
