use super::*;
use crate::api::decode_event;
use crate::types::{
    CancelRunResponse, ExecutePlanResponse, PlanDraftResponse, PlanStatus, SyncPlan,
    SyncRunResponse, Task,
};
use serde_json::json;
use std::path::Path;

const RUN: &str = "run-1";

fn apply(reducer: &mut RunReducer, run_id: &str, frame: serde_json::Value) -> Reduction {
    let decoded = decode_event(frame.to_string().as_bytes()).expect("frame should decode");
    reducer.apply_event(run_id, decoded.id, &decoded.event)
}

fn streaming_reducer() -> RunReducer {
    let mut reducer = RunReducer::new();
    reducer.begin_request("build it");
    reducer.attach_run(RUN);
    reducer
}

fn task(role: &str, description: &str) -> Task {
    Task {
        role: role.to_string(),
        description: description.to_string(),
        ..Task::default()
    }
}

#[test]
fn test_run_module_structure() {
    let _ = std::any::TypeId::of::<RunReducer>();
    let _ = std::any::TypeId::of::<TaskOutputReassembler>();
    let _ = std::any::TypeId::of::<RunState>();

    assert!(Path::new("src/state/run/reducer.rs").exists());
    assert!(Path::new("src/state/run/reassembly.rs").exists());
    assert!(Path::new("src/state/run/state.rs").exists());
}

#[test]
fn test_begin_request_resets_previous_run() {
    let mut reducer = streaming_reducer();
    apply(&mut reducer, RUN, json!({"type": "session", "data": {"sessionId": "s1"}, "id": 4}));
    reducer.begin_request("second question");

    let state = reducer.state();
    assert_eq!(state.messages, vec![Message::user("second question")]);
    assert_eq!(state.session_id, None);
    assert_eq!(state.last_event_id, 0);
    assert!(state.is_working);
    assert_eq!(state.phase, RunPhase::AwaitingPlan);
}

#[test]
fn test_streaming_run_scenario() {
    let mut reducer = streaming_reducer();

    apply(&mut reducer, RUN, json!({"type": "session", "data": {"sessionId": "s1"}, "id": 1}));
    apply(
        &mut reducer,
        RUN,
        json!({
            "type": "plan",
            "id": 2,
            "data": {
                "plan": {"objective": "Obj", "tasks": [{"role": "r1", "description": "d1"}]},
                "planId": "p1",
                "status": "DRAFT"
            }
        }),
    );
    assert_eq!(reducer.state().phase, RunPhase::PlanReady);
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "id": 3, "data": {"taskId": "t1", "sequence": 0, "chunk": "Hel", "done": false}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "id": 4, "data": {"taskId": "t1", "sequence": 1, "chunk": "lo", "done": true}}),
    );
    let reduction = apply(
        &mut reducer,
        RUN,
        json!({"type": "run-complete", "id": 5, "data": {"status": "COMPLETED"}}),
    );

    assert!(reduction.closes_connection());
    let state = reducer.state();
    assert_eq!(state.session_id.as_deref(), Some("s1"));
    assert_eq!(state.last_message(), Some(&Message::agent("Hello")));
    let plan = state.plan.as_ref().expect("plan should be set");
    assert_eq!(plan.objective, "Obj");
    assert_eq!(plan.tasks, vec![task("r1", "d1")]);
    assert_eq!(plan.plan_id, "p1");
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(!state.is_working);
    assert_eq!(state.phase, RunPhase::Completed);
    assert_eq!(state.last_event_id, 5);
}

#[test]
fn test_task_output_message_carries_role_prefix() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "data": {"taskId": "t1", "role": "writer", "sequence": 1, "chunk": "world", "done": false}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "data": {"taskId": "t1", "sequence": 0, "chunk": "hello ", "done": false}}),
    );
    assert_eq!(reducer.state().messages.len(), 1);
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "data": {"taskId": "t1", "sequence": 2, "chunk": "", "done": true}}),
    );
    assert_eq!(
        reducer.state().last_message(),
        Some(&Message::agent("**writer**\n\nhello world"))
    );
    assert_eq!(reducer.reassembler().pending_tasks(), 0);
}

#[test]
fn test_task_output_without_task_id_is_skipped() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "data": {"sequence": 0, "chunk": "lost", "done": true}}),
    );
    assert_eq!(reducer.state().messages.len(), 1);
}

#[test]
fn test_plan_update_appends_tasks_and_keeps_objective_when_empty() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "Ship", "tasks": [
            {"role": "a", "description": "T1"},
            {"role": "b", "description": "T2"}
        ]}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan-update", "data": {"objective": "", "tasks": [{"role": "c", "description": "T3"}],
            "findings": [{"role": "a", "output": "found"}]}}),
    );

    let plan = reducer.state().plan.as_ref().expect("plan should be set");
    assert_eq!(plan.objective, "Ship");
    assert_eq!(
        plan.tasks,
        vec![task("a", "T1"), task("b", "T2"), task("c", "T3")]
    );
    assert_eq!(plan.findings.len(), 1);

    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan-update", "data": {"plan": {"objective": "Ship faster", "tasks": []}}}),
    );
    let plan = reducer.state().plan.as_ref().expect("plan should be set");
    assert_eq!(plan.objective, "Ship faster");
    assert_eq!(plan.tasks.len(), 3);
}

#[test]
fn test_plan_status_never_moves_backward() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "o", "tasks": [], "status": "EXECUTING"}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan-update", "data": {"tasks": [], "status": "DRAFT"}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "o2", "tasks": [], "status": "DRAFT"}}),
    );
    let plan = reducer.state().plan.as_ref().expect("plan should be set");
    assert_eq!(plan.objective, "o2");
    assert_eq!(plan.status, PlanStatus::Executing);
}

#[test]
fn test_final_stops_working_and_freezes_run() {
    let mut reducer = streaming_reducer();
    let reduction = apply(
        &mut reducer,
        RUN,
        json!({"type": "final", "data": {"finalAnswer": "done"}}),
    );
    assert!(reduction.closes_connection());
    assert!(!reducer.state().is_working);
    assert_eq!(reducer.state().last_message(), Some(&Message::agent("done")));

    let snapshot = reducer.state().clone();
    for frame in [
        json!({"type": "task-output", "id": 9, "data": {"taskId": "t9", "sequence": 0, "chunk": "late", "done": true}}),
        json!({"type": "error", "data": {"message": "late"}}),
        json!({"type": "final", "data": {"finalAnswer": "again"}}),
    ] {
        assert_eq!(apply(&mut reducer, RUN, frame), Reduction::Ignored);
    }
    assert_eq!(reducer.state(), &snapshot);
}

#[test]
fn test_final_with_empty_answer_appends_nothing() {
    let mut reducer = streaming_reducer();
    apply(&mut reducer, RUN, json!({"type": "final", "data": {"finalAnswer": ""}}));
    assert_eq!(reducer.state().messages.len(), 1);
    assert_eq!(reducer.state().phase, RunPhase::Completed);
}

#[test]
fn test_failed_run_complete_is_errored_without_touching_plan() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "o", "tasks": []}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "run-complete", "data": {"status": "FAILED"}}),
    );
    let state = reducer.state();
    assert_eq!(state.phase, RunPhase::Errored);
    assert_eq!(
        state.plan.as_ref().map(|plan| plan.status),
        Some(PlanStatus::Draft)
    );
    assert!(!state.is_working);
}

#[test]
fn test_run_cancel_event_marks_plan_cancelled() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "o", "tasks": [], "status": "EXECUTING"}}),
    );
    let reduction = apply(&mut reducer, RUN, json!({"type": "run-cancel", "data": {}}));
    assert!(reduction.closes_connection());
    let state = reducer.state();
    assert_eq!(state.phase, RunPhase::Cancelled);
    assert_eq!(
        state.plan.as_ref().map(|plan| plan.status),
        Some(PlanStatus::Cancelled)
    );
    assert_eq!(
        state.last_message(),
        Some(&Message::system(RUN_CANCELLED_MESSAGE))
    );
}

#[test]
fn test_error_event_uses_fallback_text() {
    let mut reducer = streaming_reducer();
    apply(&mut reducer, RUN, json!({"type": "error", "data": null}));
    assert_eq!(
        reducer.state().last_message(),
        Some(&Message::system(UNKNOWN_ERROR_MESSAGE))
    );
    assert_eq!(reducer.state().phase, RunPhase::Errored);
}

#[test]
fn test_watermark_tracks_highest_id_under_any_order() {
    let mut reducer = streaming_reducer();
    for id in [2u64, 1, 5, 3, 5, 4] {
        let before = reducer.state().last_event_id;
        apply(
            &mut reducer,
            RUN,
            json!({"type": "status", "id": id, "data": {"message": format!("step {id}")}}),
        );
        assert!(reducer.state().last_event_id >= before);
    }
    assert_eq!(reducer.state().last_event_id, 5);
    assert_eq!(reducer.state().status_message.as_deref(), Some("step 4"));
}

#[test]
fn test_redelivered_done_chunk_does_not_duplicate_message() {
    let mut reducer = streaming_reducer();
    let done = json!({"type": "task-output", "id": 7, "data": {"taskId": "t1", "sequence": 0, "chunk": "once", "done": true}});
    assert!(apply(&mut reducer, RUN, done.clone()).is_applied());
    reducer.set_connection(ConnectionStatus::Reconnecting {
        attempt: 1,
        retry_in_ms: 500,
    });
    assert_eq!(apply(&mut reducer, RUN, done), Reduction::Ignored);
    let agent_messages = reducer
        .state()
        .messages
        .iter()
        .filter(|message| message.kind == MessageKind::Agent)
        .count();
    assert_eq!(agent_messages, 1);
}

#[test]
fn test_events_for_superseded_run_are_discarded() {
    let mut reducer = streaming_reducer();
    reducer.attach_run("run-2");
    let reduction = apply(
        &mut reducer,
        RUN,
        json!({"type": "final", "data": {"finalAnswer": "stale"}}),
    );
    assert_eq!(reduction, Reduction::Ignored);
    assert!(reducer.state().is_working);
}

#[test]
fn test_attaching_new_run_resets_watermark() {
    let mut reducer = streaming_reducer();
    apply(&mut reducer, RUN, json!({"type": "status", "id": 12, "data": {}}));
    reducer.attach_run(RUN);
    assert_eq!(reducer.state().last_event_id, 12);
    reducer.attach_run("run-2");
    assert_eq!(reducer.state().last_event_id, 0);
    assert!(apply(&mut reducer, "run-2", json!({"type": "status", "id": 12, "data": {}})).is_applied());
}

#[test]
fn test_unknown_event_type_is_ignored() {
    let mut reducer = streaming_reducer();
    let snapshot = reducer.state().clone();
    let reduction = apply(&mut reducer, RUN, json!({"type": "heartbeat", "id": 3, "data": {}}));
    assert_eq!(reduction, Reduction::Ignored);
    assert_eq!(reducer.state(), &snapshot);
}

#[test]
fn test_task_lifecycle_tracks_tasks_in_flight() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "o", "tasks": [{"role": "r", "description": "d"}]}}),
    );
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-start", "data": {"taskId": "t1", "role": "r", "description": "d"}}),
    );
    assert_eq!(reducer.state().phase, RunPhase::Executing);
    assert_eq!(
        reducer
            .state()
            .plan
            .as_ref()
            .map(|plan| plan.status),
        Some(PlanStatus::Draft)
    );
    let progress = reducer.state().tasks_in_flight.get("t1").cloned();
    assert_eq!(
        progress,
        Some(TaskProgress {
            role: Some("r".to_string()),
            description: Some("d".to_string()),
            finished: false,
        })
    );

    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "data": {"taskId": "t1", "sequence": 0, "chunk": "x", "done": true}}),
    );
    assert_eq!(
        reducer.state().tasks_in_flight.get("t1").map(|p| p.finished),
        Some(true)
    );
    apply(&mut reducer, RUN, json!({"type": "task-complete", "data": {"taskId": "t1"}}));
    assert!(reducer.state().tasks_in_flight.is_empty());
}

#[test]
fn test_sync_response_completes_run() {
    let mut reducer = RunReducer::new();
    reducer.begin_request("sync please");
    reducer.apply_sync_response(&SyncRunResponse {
        plan: Some(SyncPlan {
            objective: "o".to_string(),
            tasks: vec![task("r", "d")],
        }),
        final_answer: Some("answer".to_string()),
    });
    let state = reducer.state();
    assert!(!state.is_working);
    assert_eq!(state.phase, RunPhase::Completed);
    assert_eq!(state.last_message(), Some(&Message::agent("answer")));
    assert_eq!(state.plan.as_ref().map(|plan| plan.tasks.len()), Some(1));
}

#[test]
fn test_plan_draft_then_execution_attaches_new_run() {
    let mut reducer = RunReducer::new();
    reducer.begin_request("plan first");
    reducer.apply_plan_draft(&PlanDraftResponse {
        objective: Some("o".to_string()),
        tasks: Some(vec![task("r", "d")]),
        plan_id: Some("p1".to_string()),
        session_id: Some("s1".to_string()),
        ..PlanDraftResponse::default()
    });
    assert!(reducer.has_reviewable_plan());
    assert_eq!(reducer.state().session_id.as_deref(), Some("s1"));

    let plan_id = reducer.begin_execution_request(Some("smaller steps"));
    assert_eq!(plan_id.as_deref(), Some("p1"));
    assert!(reducer.state().is_working);
    assert_eq!(
        reducer.state().last_message(),
        Some(&Message::user("smaller steps"))
    );

    let run_id = reducer.apply_execution(&ExecutePlanResponse {
        run_id: Some("exec-1".to_string()),
        final_answer: None,
    });
    assert_eq!(run_id.as_deref(), Some("exec-1"));
    let state = reducer.state();
    assert_eq!(state.phase, RunPhase::Executing);
    assert_eq!(state.active_run_id.as_deref(), Some("exec-1"));
    assert_eq!(
        state.plan.as_ref().map(|plan| plan.status),
        Some(PlanStatus::Executing)
    );
    assert!(!reducer.has_reviewable_plan());
    assert_eq!(reducer.begin_execution_request(None), None);
}

#[test]
fn test_failed_execution_keeps_plan_reviewable() {
    let mut reducer = RunReducer::new();
    reducer.begin_request("plan first");
    reducer.apply_plan_draft(&PlanDraftResponse {
        objective: Some("o".to_string()),
        plan_id: Some("p1".to_string()),
        ..PlanDraftResponse::default()
    });
    reducer.begin_execution_request(None);
    reducer.fail_request("Failed to execute plan (500).");

    assert!(!reducer.state().is_working);
    assert_eq!(reducer.state().phase, RunPhase::PlanReady);
    assert!(reducer.has_reviewable_plan());
}

#[test]
fn test_start_failure_moves_to_errored() {
    let mut reducer = RunReducer::new();
    reducer.begin_request("hello");
    reducer.fail_request(MISSING_RUN_ID_MESSAGE);
    let state = reducer.state();
    assert!(!state.is_working);
    assert_eq!(state.phase, RunPhase::Errored);
    assert_eq!(
        state.last_message(),
        Some(&Message::system(MISSING_RUN_ID_MESSAGE))
    );
}

#[test]
fn test_cancel_success_clears_plan_and_connection() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "plan", "data": {"objective": "o", "tasks": []}}),
    );
    assert_eq!(reducer.begin_cancel().as_deref(), Some(RUN));
    assert!(!reducer.state().is_working);

    reducer.cancel_succeeded();
    let state = reducer.state();
    assert_eq!(state.plan, None);
    assert_eq!(state.connection, ConnectionStatus::Closed);
    assert_eq!(state.active_run_id, None);
    assert_eq!(state.phase, RunPhase::Cancelled);
    assert_eq!(
        state.last_message(),
        Some(&Message::system(CANCEL_SUCCEEDED_MESSAGE))
    );
}

#[test]
fn test_cancel_rejection_restores_working() {
    let mut reducer = streaming_reducer();
    let response = CancelRunResponse {
        status: "error".to_string(),
        message: Some("busy".to_string()),
    };
    assert!(!response.is_success());
    reducer.begin_cancel();
    reducer.cancel_failed("Failed to cancel run: busy");
    assert!(reducer.state().is_working);
    assert!(reducer
        .state()
        .last_message()
        .is_some_and(|message| message.content.contains("busy")));
}

#[test]
fn test_cancel_without_active_run_returns_none() {
    let mut reducer = RunReducer::new();
    assert_eq!(reducer.begin_cancel(), None);
    reducer.begin_request("hello");
    assert_eq!(reducer.begin_cancel(), None);
}

#[test]
fn test_clear_chat_discards_everything() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "data": {"taskId": "t1", "sequence": 0, "chunk": "x", "done": false}}),
    );
    reducer.clear_chat();
    assert_eq!(reducer.state(), &RunState::new());
    assert_eq!(reducer.reassembler().pending_tasks(), 0);
}

#[test]
fn test_replay_floor_only_drops_ids_seen_before_the_drop() {
    let mut reducer = streaming_reducer();
    apply(&mut reducer, RUN, json!({"type": "status", "id": 3, "data": {"message": "three"}}));
    reducer.set_connection(ConnectionStatus::Reconnecting {
        attempt: 1,
        retry_in_ms: 500,
    });
    reducer.set_connection(ConnectionStatus::Open);

    let replayed = json!({"type": "status", "id": 2, "data": {"message": "two"}});
    assert_eq!(apply(&mut reducer, RUN, replayed), Reduction::Ignored);
    let fresh = json!({"type": "status", "id": 4, "data": {"message": "four"}});
    assert!(apply(&mut reducer, RUN, fresh).is_applied());
    assert_eq!(reducer.state().status_message.as_deref(), Some("four"));

    reducer.attach_run("run-2");
    let other_run = json!({"type": "status", "id": 1, "data": {"message": "new run"}});
    assert!(apply(&mut reducer, "run-2", other_run).is_applied());
}

#[test]
fn test_plan_with_explicit_nulls_reaches_plan_ready() {
    let mut reducer = streaming_reducer();
    let reduction = apply(
        &mut reducer,
        RUN,
        json!({"id": 3, "type": "plan", "data": {
            "objective": "Obj",
            "tasks": [{"id": null, "role": null, "description": "d1", "expectedOutput": null}],
            "findings": null
        }}),
    );
    assert!(reduction.is_applied());
    assert_eq!(reducer.state().phase, RunPhase::PlanReady);
    let plan = reducer.state().plan.as_ref().expect("plan");
    assert_eq!(plan.tasks, vec![task("", "d1")]);
    assert!(reducer
        .state()
        .plan_markdown()
        .is_some_and(|markdown| markdown.contains("- **1. role**: d1")));

    apply(
        &mut reducer,
        RUN,
        json!({"id": 4, "type": "plan-update", "data": {
            "objective": null,
            "tasks": [{"role": "editor", "description": null}],
            "findings": [{"role": null, "taskId": null, "output": null}]
        }}),
    );
    let plan = reducer.state().plan.as_ref().expect("plan");
    assert_eq!(plan.objective, "Obj");
    assert_eq!(plan.tasks.len(), 2);
    assert_eq!(plan.findings.len(), 1);
}

#[test]
fn test_task_output_with_huge_sequence_finalizes() {
    let mut reducer = streaming_reducer();
    apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "id": 1, "data": {"taskId": "t1", "sequence": 0, "chunk": "a", "done": false}}),
    );
    let reduction = apply(
        &mut reducer,
        RUN,
        json!({"type": "task-output", "id": 2, "data": {"taskId": "t1", "sequence": usize::MAX, "chunk": "z", "done": true}}),
    );
    assert!(reduction.is_applied());
    assert_eq!(reducer.state().last_message(), Some(&Message::agent("az")));
    assert_eq!(reducer.reassembler().pending_tasks(), 0);
}
