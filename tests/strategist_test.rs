// tests/strategist_test.rs — Integration test: plan/critique loop with scripted models

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use layout_copilot::core::strategist::StrategistEvent;
use layout_copilot::core::types::{AuditKind, LoopOutcome, Stage};
use layout_copilot::infra::errors::CopilotError;
use layout_copilot::provider::ToolCall;

fn s(v: &str) -> String {
    v.to_string()
}

// ─── Acceptance ─────────────────────────────────────────────────

#[tokio::test]
async fn test_accepts_on_first_pass() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(true, 9.0, &[], &["Widen the main aisle"])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&["Aisles must be 1.2 m wide."]));
    let strategist = strategist(provider.clone(), retriever.clone(), config(5));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert!(report.is_accepted());
    assert_eq!(report.iterations, 1);
    let plan = report.final_plan.as_ref().unwrap();
    assert_eq!(plan.best_practice_score, 9.0);
    assert_eq!(plan.compliance_notes, vec!["Widen the main aisle"]);
    assert_eq!(plan.zones[0].name, "Smartphones");
    assert_eq!(report.audit.count(AuditKind::Accepted), 1);
    assert_eq!(report.audit.count(AuditKind::Refined), 0);
    assert_eq!(provider.planner_calls(), 1);
    assert_eq!(provider.reviewer_calls(), 1);
    assert_eq!(report.accepted_plan().unwrap().zones.len(), 2);
}

#[tokio::test]
async fn test_refines_until_accepted() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[
            review_json(false, 6.0, &["Fixtures on northern wall"], &[]),
            review_json(true, 8.0, &[], &[]),
            review_json(true, 9.0, &[], &[]),
        ],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&["No fixtures on northern wall."]));
    let strategist = strategist(provider.clone(), retriever.clone(), config(5));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.audit.count(AuditKind::Refined), 2);
    assert_eq!(report.final_plan.unwrap().best_practice_score, 9.0);

    let queries = retriever.queries();
    assert_eq!(queries.len(), 3);
    assert!(queries[0].0.starts_with("Blue Retail Ventures store layout constraints for Surat"));
    assert_eq!(queries[1].0, "Fix layout issues in Surat: Fixtures on northern wall");
    assert_eq!(queries[2].0, "Improve best practices for Surat store layout");
}

#[tokio::test]
async fn test_compliant_below_threshold_not_accepted() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(true, 8.49, &[], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&[]));
    let strategist = strategist(provider, retriever, config(2));

    let report = strategist.run(&store_request()).await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::BudgetExceeded);
}

#[tokio::test]
async fn test_high_score_but_non_compliant_not_accepted() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(false, 10.0, &["Blocked fire exit"], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&[]));
    let strategist = strategist(provider, retriever, config(2));

    let report = strategist.run(&store_request()).await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::BudgetExceeded);
    assert!(report.final_plan.is_none());
}

// ─── Budget ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_budget_exceeded() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(false, 5.0, &["Too narrow"], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&["Aisles must be 1.2 m wide."]));
    let strategist = strategist(provider.clone(), retriever, config(2));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::BudgetExceeded);
    assert!(report.final_plan.is_none());
    assert!(report.last_draft.is_some());
    assert_eq!(report.iterations, 2);
    assert_eq!(report.audit.count(AuditKind::Refined), 1);
    assert_eq!(report.audit.count(AuditKind::BudgetExceeded), 1);
    assert_eq!(provider.reviewer_calls(), 2);
    assert!(matches!(
        report.unaccepted_error(),
        CopilotError::BudgetExceeded { iterations: 2 }
    ));
    assert!(report.accepted_plan().is_err());
}

#[tokio::test]
async fn test_single_iteration_budget() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(false, 5.0, &[], &[])],
    ));
    let strategist = strategist(provider, Arc::new(RecordingRetriever::new(&[])), config(1));

    let report = strategist.run(&store_request()).await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::BudgetExceeded);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.audit.count(AuditKind::Refined), 0);
}

// ─── Malformed output ───────────────────────────────────────────

#[tokio::test]
async fn test_malformed_draft_keeps_previous_plan() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones"), s("Sorry, I can't produce JSON today.")],
        &[
            review_json(false, 5.0, &["Move checkout"], &[]),
            review_json(true, 9.0, &[], &[]),
        ],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&[]));
    let strategist = strategist(provider.clone(), retriever, config(5));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.audit.count(AuditKind::Malformed), 1);
    // The second review saw the first draft again
    let reviews = provider.reviewer_prompts.lock().unwrap();
    assert!(reviews[1].contains("Smartphones"));
    assert_eq!(report.final_plan.unwrap().zones[0].name, "Smartphones");
}

#[tokio::test]
async fn test_no_draft_skips_review() {
    let provider = Arc::new(ScriptedProvider::new(
        &[s("not json"), plan_json("Audio")],
        &[review_json(true, 9.5, &[], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&[]));
    let strategist = strategist(provider.clone(), retriever, config(5));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert_eq!(report.iterations, 2);
    assert_eq!(provider.planner_calls(), 2);
    assert_eq!(provider.reviewer_calls(), 1);
    assert_eq!(report.final_plan.unwrap().zones[0].name, "Audio");
}

#[tokio::test]
async fn test_malformed_review_fails_closed() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[s("The layout looks great!"), review_json(true, 9.0, &[], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&[]));
    let strategist = strategist(provider, retriever.clone(), config(5));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.audit.count(AuditKind::Malformed), 1);
    // Fail-closed review has no feedback, so the next query is generic
    assert_eq!(retriever.queries()[1].0, "Improve best practices for Surat store layout");
}

#[tokio::test]
async fn test_out_of_bounds_draft_is_malformed() {
    let oversized = plan_json("Smartphones").replace("\"width\":5", "\"width\":50");
    let provider = Arc::new(ScriptedProvider::new(
        &[oversized],
        &[review_json(true, 9.0, &[], &[])],
    ));
    let strategist = strategist(provider.clone(), Arc::new(RecordingRetriever::new(&[])), config(2));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::BudgetExceeded);
    assert!(report.last_draft.is_none());
    assert_eq!(provider.reviewer_calls(), 0);
    assert_eq!(report.audit.count(AuditKind::Malformed), 2);
}

// ─── Remote failures ────────────────────────────────────────────

#[tokio::test]
async fn test_retrieval_failure_continues_without_context() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(true, 9.0, &[], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::failing());
    let strategist = strategist(provider, retriever, config(5));

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert!(report.retrieved.is_empty());
    let failures: Vec<_> = report
        .audit
        .entries()
        .iter()
        .filter(|e| e.kind == AuditKind::RemoteFailure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Retrieve);
}

#[tokio::test]
async fn test_call_timeout_counts_as_remote_failure() {
    let provider = Arc::new(
        ScriptedProvider::new(&[plan_json("Smartphones")], &[review_json(true, 9.0, &[], &[])])
            .with_delay(Duration::from_millis(300)),
    );
    let mut cfg = config(2);
    cfg.call_timeout = Duration::from_millis(20);
    let strategist = strategist(provider, Arc::new(RecordingRetriever::new(&[])), cfg);

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::BudgetExceeded);
    assert!(report.last_draft.is_none());
    assert_eq!(report.audit.count(AuditKind::RemoteFailure), 2);
}

#[tokio::test]
async fn test_loop_timeout() {
    let provider = Arc::new(
        ScriptedProvider::new(&[plan_json("Smartphones")], &[review_json(true, 9.0, &[], &[])])
            .with_delay(Duration::from_millis(500)),
    );
    let mut cfg = config(5);
    cfg.loop_timeout = Duration::from_millis(50);
    let strategist = strategist(provider, Arc::new(RecordingRetriever::new(&[])), cfg);

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::TimedOut);
    assert!(report.final_plan.is_none());
    assert_eq!(report.audit.count(AuditKind::TimedOut), 1);
    assert!(matches!(report.unaccepted_error(), CopilotError::LoopTimeout { .. }));
}

// ─── Prompts and retrieval ──────────────────────────────────────

#[tokio::test]
async fn test_planner_prompt_carries_trends_context_and_requirements() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(true, 9.0, &[], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&["Decompression zone of 3 m at the entrance."]));
    let strategist = strategist(provider.clone(), retriever, config(5));

    strategist.run(&store_request()).await.unwrap();

    let prompts = provider.planner_prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.contains("Surat"));
    assert!(prompt.contains("south"));
    assert!(prompt.contains("- iphone 15: 95"));
    assert!(prompt.contains("Decompression zone of 3 m"));
    assert!(prompt.contains("- No permanent fixtures on the northern wall"));

    let reviews = provider.reviewer_prompts.lock().unwrap();
    assert!(reviews[0].contains("Decompression zone of 3 m"));
}

#[tokio::test]
async fn test_tool_call_retrieval_uses_model_query() {
    let provider = Arc::new(
        ScriptedProvider::new(&[plan_json("Smartphones")], &[review_json(true, 9.0, &[], &[])])
            .with_tool_calls(vec![ToolCall {
                id: "call_1".into(),
                name: "rag_tool".into(),
                arguments: serde_json::json!({"query": "north wall lease clause", "top_k": 3}),
            }]),
    );
    let retriever = Arc::new(RecordingRetriever::new(&["Lease: nothing on the north wall."]));
    let mut cfg = config(5);
    cfg.tool_call_retrieval = true;
    let strategist = strategist(provider.clone(), retriever.clone(), cfg);

    let report = strategist.run(&store_request()).await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Accepted);
    assert_eq!(*provider.tool_requests.lock().unwrap(), 1);
    assert_eq!(retriever.queries(), vec![(s("north wall lease clause"), 3)]);
}

#[tokio::test]
async fn test_tool_call_top_k_capped_at_configured() {
    let provider = Arc::new(
        ScriptedProvider::new(&[plan_json("Smartphones")], &[review_json(true, 9.0, &[], &[])])
            .with_tool_calls(vec![ToolCall {
                id: "call_1".into(),
                name: "rag_tool".into(),
                arguments: serde_json::json!({"query": "fire exits", "top_k": 100000}),
            }]),
    );
    let retriever = Arc::new(RecordingRetriever::new(&["Two exits required."]));
    let mut cfg = config(5);
    cfg.tool_call_retrieval = true;
    let top_k = cfg.retrieval_top_k;
    let strategist = strategist(provider, retriever.clone(), cfg);

    strategist.run(&store_request()).await.unwrap();

    assert_eq!(retriever.queries(), vec![(s("fire exits"), top_k)]);
}

#[tokio::test]
async fn test_tool_call_retrieval_forces_seeded_query() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(true, 9.0, &[], &[])],
    ));
    let retriever = Arc::new(RecordingRetriever::new(&[]));
    let mut cfg = config(5);
    cfg.tool_call_retrieval = true;
    let top_k = cfg.retrieval_top_k;
    let strategist = strategist(provider, retriever.clone(), cfg);

    strategist.run(&store_request()).await.unwrap();

    let queries = retriever.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].0.contains("store layout constraints for Surat"));
    assert_eq!(queries[0].1, top_k);
}

// ─── Progress ───────────────────────────────────────────────────

#[tokio::test]
async fn test_progress_events() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(false, 4.0, &["x"], &[]), review_json(true, 9.0, &[], &[])],
    ));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let strategist = strategist(provider, Arc::new(RecordingRetriever::new(&["chunk"])), config(5))
        .with_progress(move |e| sink.lock().unwrap().push(e));

    strategist.run(&store_request()).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            StrategistEvent::IterationStarted { iteration: 0 },
            StrategistEvent::Retrieved { chunks: 1 },
            StrategistEvent::Drafted { usable: true },
            StrategistEvent::Reviewed { compliant: false, score: 4.0 },
            StrategistEvent::Refining { next_iteration: 1 },
            StrategistEvent::IterationStarted { iteration: 1 },
            StrategistEvent::Retrieved { chunks: 1 },
            StrategistEvent::Drafted { usable: true },
            StrategistEvent::Reviewed { compliant: true, score: 9.0 },
            StrategistEvent::Accepted { score: 9.0 },
        ]
    );
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let provider = Arc::new(ScriptedProvider::new(
        &[plan_json("Smartphones")],
        &[review_json(true, 9.0, &[], &[])],
    ));
    let strategist = Arc::new(strategist(provider, Arc::new(RecordingRetriever::new(&[])), config(5)));

    let mut request_b = store_request();
    request_b.city = "Mumbai".into();
    let request_a = store_request();
    let (a, b) = tokio::join!(strategist.run(&request_a), strategist.run(&request_b));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_accepted() && b.is_accepted());
    assert_eq!(a.audit.len(), b.audit.len());
}
