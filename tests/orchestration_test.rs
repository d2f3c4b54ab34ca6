//! 编排集成测试：多子任务场景、账本交替、事件顺序、流中取消

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use hornet::agent::{MockAgentBackend, ScriptedRun};
use hornet::core::{AgentError, Orchestrator, RunEvent, RunState, Subtask};
use hornet::history::{OutputItem, RunIncrement, TurnRole};

/// 一个子任务：1 message + 1 action_call + 1 action_result，单增量完成
fn full_step_run() -> ScriptedRun {
    ScriptedRun::Items(vec![Ok(RunIncrement::new(vec![
        OutputItem::message("on it"),
        OutputItem::action_call("click", json!({ "type": "click", "x": 1, "y": 2 })),
        OutputItem::action_result(json!({ "type": "input_image", "image_url": "img" })),
    ]))])
}

#[tokio::test]
async fn test_three_task_scenario_totals_and_ledger() {
    let backend = Arc::new(MockAgentBackend::scripted(vec![
        full_step_run(),
        full_step_run(),
        full_step_run(),
    ]));
    let mut orch = Orchestrator::new(backend.clone(), CancellationToken::new());

    let subtasks = vec![
        Subtask::new("create file X"),
        Subtask::new("write row to X"),
        Subtask::new("verify X"),
    ];
    let summary = orch.run(&subtasks).await.unwrap();

    assert_eq!(summary.state, RunState::Done);
    assert_eq!(*orch.state(), RunState::Done);
    assert_eq!(summary.totals.messages, 3);
    assert_eq!(summary.totals.action_calls, 3);
    assert_eq!(summary.totals.action_results, 3);
    assert_eq!(backend.calls(), 3);

    // 账本：N 用户条目与 N agent 条目严格交替，用户在前
    let turns = orch.ledger().snapshot();
    assert_eq!(turns.len(), 6);
    for (i, turn) in turns.iter().enumerate() {
        let expected = if i % 2 == 0 {
            TurnRole::User
        } else {
            TurnRole::Agent
        };
        assert_eq!(turn.role, expected, "turn {} role mismatch", i);
    }
}

#[tokio::test]
async fn test_event_order_per_subtask() {
    let backend = Arc::new(MockAgentBackend::scripted(vec![full_step_run()]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut orch = Orchestrator::new(backend, CancellationToken::new()).with_event_tx(tx);

    orch.run(&[Subtask::new("one task")]).await.unwrap();
    drop(orch);

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }

    assert!(matches!(events[0], RunEvent::TaskStarted { index: 0, .. }));
    assert!(matches!(events[1], RunEvent::AgentMessage { .. }));
    assert!(matches!(events[2], RunEvent::ActionIssued { .. }));
    assert!(matches!(events[3], RunEvent::ActionObserved));
    assert!(matches!(events[4], RunEvent::IncrementFolded { items: 3 }));
    assert!(matches!(events[5], RunEvent::TaskCompleted { index: 0, .. }));
    assert_eq!(events.len(), 6);
}

#[tokio::test]
async fn test_cancel_while_awaiting_increments() {
    // 子任务 2 的流永不产出，模拟等待远端时收到取消
    let backend = Arc::new(MockAgentBackend::scripted(vec![
        full_step_run(),
        ScriptedRun::Pending,
        full_step_run(),
    ]));
    let token = CancellationToken::new();
    let mut orch = Orchestrator::new(backend.clone(), token.clone());

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let subtasks = vec![
        Subtask::new("task 1"),
        Subtask::new("task 2"),
        Subtask::new("task 3"),
    ];
    let err = orch.run(&subtasks).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(*orch.state(), RunState::Cancelled);
    // 子任务 3 从未开始
    assert_eq!(backend.calls(), 2);
    // 取消前的账本保留：任务 1 两条 + 任务 2 的用户条目
    assert_eq!(orch.ledger().len(), 3);
}

#[tokio::test]
async fn test_session_error_aborts_remaining_tasks() {
    let backend = Arc::new(MockAgentBackend::scripted(vec![
        full_step_run(),
        ScriptedRun::Items(vec![Err(AgentError::Transient(
            "connection reset".to_string(),
        ))]),
        full_step_run(),
    ]));
    let mut orch = Orchestrator::new(backend.clone(), CancellationToken::new());

    let subtasks = vec![
        Subtask::new("task 1"),
        Subtask::new("task 2"),
        Subtask::new("task 3"),
    ];
    let err = orch.run(&subtasks).await.unwrap_err();

    assert!(matches!(err, AgentError::Transient(_)));
    assert_eq!(*orch.state(), RunState::Failed);
    assert_eq!(backend.calls(), 2);
}
