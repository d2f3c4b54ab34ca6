//! 编排器：主控循环
//!
//! 按序驱动子任务，所有子任务共享同一账本；任务间可加固定延时（对远端环境的限速礼让）。
//! fail-fast：任一子任务出错即中止其余子任务并向上报告，不做自动重试——
//! 重试是操作者层面的整段重跑。取消在每个挂起点检查，以 Cancelled 终态收尾，不算失败。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::AgentBackend;
use crate::core::events::{send_event, RunEvent};
use crate::core::task_runner::{self, Subtask, TaskReport};
use crate::core::{AgentError, RunState};
use crate::history::HistoryLedger;

/// 一次编排运行的汇总：逐任务报告、聚合统计与时间戳
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub state: RunState,
    pub reports: Vec<TaskReport>,
    pub totals: TaskReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// 编排器：独占账本与取消令牌，驱动一次完整运行
pub struct Orchestrator {
    backend: Arc<dyn AgentBackend>,
    ledger: HistoryLedger,
    state: RunState,
    run_id: Uuid,
    inter_task_delay: Duration,
    cancel_token: CancellationToken,
    event_tx: Option<UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn AgentBackend>, cancel_token: CancellationToken) -> Self {
        Self {
            backend,
            ledger: HistoryLedger::new(),
            state: RunState::Init,
            run_id: Uuid::new_v4(),
            inter_task_delay: Duration::ZERO,
            cancel_token,
            event_tx: None,
        }
    }

    pub fn with_inter_task_delay(mut self, delay: Duration) -> Self {
        self.inter_task_delay = delay;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 按序执行全部子任务；一个编排器只驱动一次运行
    pub async fn run(&mut self, subtasks: &[Subtask]) -> Result<RunSummary, AgentError> {
        if self.state != RunState::Init {
            return Err(AgentError::Session(format!(
                "orchestrator already ran (state: {})",
                self.state
            )));
        }

        let started_at = Utc::now();
        let total = subtasks.len();
        tracing::info!("Starting run {} with {} subtasks", self.run_id, total);

        self.state = RunState::Validating;
        if self.cancel_token.is_cancelled() {
            return Err(self.finish_cancelled());
        }
        // 会话句柄在构造时即已开通，这里只标记阶段推进
        self.state = RunState::Provisioned;

        let mut reports: Vec<TaskReport> = Vec::with_capacity(total);

        for (i, subtask) in subtasks.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                return Err(self.finish_cancelled());
            }

            self.state = RunState::Running(i);
            send_event(
                self.event_tx.as_ref(),
                RunEvent::TaskStarted {
                    index: i,
                    total,
                    instruction: subtask.instruction.clone(),
                },
            );

            let report = match task_runner::execute(
                self.backend.as_ref(),
                &mut self.ledger,
                subtask,
                &self.cancel_token,
                self.event_tx.as_ref(),
            )
            .await
            {
                Ok(report) => report,
                Err(e) if e.is_cancelled() => return Err(self.finish_cancelled()),
                Err(e) => {
                    self.state = RunState::Failed;
                    tracing::error!("Subtask {}/{} failed: {}", i + 1, total, e);
                    send_event(
                        self.event_tx.as_ref(),
                        RunEvent::RunFailed { text: e.to_string() },
                    );
                    return Err(e);
                }
            };

            send_event(
                self.event_tx.as_ref(),
                RunEvent::TaskCompleted {
                    index: i,
                    total,
                    report,
                },
            );
            reports.push(report);

            if i + 1 < total && !self.inter_task_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel_token.cancelled() => {
                        return Err(self.finish_cancelled());
                    }
                    _ = tokio::time::sleep(self.inter_task_delay) => {}
                }
            }
        }

        self.state = RunState::Done;
        let mut totals = TaskReport::default();
        for report in &reports {
            totals.merge(report);
        }
        tracing::info!(
            "Run {} done: {} messages, {} action calls, {} action results",
            self.run_id,
            totals.messages,
            totals.action_calls,
            totals.action_results
        );

        Ok(RunSummary {
            run_id: self.run_id,
            state: self.state,
            reports,
            totals,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn finish_cancelled(&mut self) -> AgentError {
        self.state = RunState::Cancelled;
        tracing::warn!("Run {} cancelled", self.run_id);
        AgentError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MockAgentBackend, ScriptedRun};
    use crate::history::{OutputItem, RunIncrement};

    fn ok_run(items: Vec<OutputItem>) -> ScriptedRun {
        ScriptedRun::Items(vec![Ok(RunIncrement::new(items))])
    }

    #[tokio::test]
    async fn test_empty_subtask_list_finishes_done() {
        let backend = Arc::new(MockAgentBackend::new());
        let mut orch = Orchestrator::new(backend.clone(), CancellationToken::new());

        let summary = orch.run(&[]).await.unwrap();
        assert_eq!(summary.state, RunState::Done);
        assert!(summary.reports.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_orchestrator_runs_only_once() {
        let backend = Arc::new(MockAgentBackend::new());
        let mut orch = Orchestrator::new(backend, CancellationToken::new());

        orch.run(&[]).await.unwrap();
        let err = orch.run(&[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Session(_)));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_subtasks() {
        let backend = Arc::new(MockAgentBackend::scripted(vec![
            ok_run(vec![OutputItem::message("done")]),
            ScriptedRun::Items(vec![Err(AgentError::Session("remote died".to_string()))]),
            ok_run(vec![OutputItem::message("never seen")]),
        ]));
        let mut orch = Orchestrator::new(backend.clone(), CancellationToken::new());

        let subtasks = vec![
            Subtask::new("task 1"),
            Subtask::new("task 2"),
            Subtask::new("task 3"),
        ];
        let err = orch.run(&subtasks).await.unwrap_err();

        assert!(matches!(err, AgentError::Session(_)));
        assert_eq!(*orch.state(), RunState::Failed);
        // 第 3 个子任务不再调用
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_budget_breach_fails_run_and_keeps_ledger() {
        let backend = Arc::new(MockAgentBackend::scripted(vec![ScriptedRun::Items(vec![
            Ok(RunIncrement::new(vec![OutputItem::message("working")]).with_cost(0.6)),
            Err(AgentError::BudgetExceeded {
                spent: 1.2,
                ceiling: 1.0,
            }),
        ])]));
        let mut orch = Orchestrator::new(backend, CancellationToken::new());

        let err = orch.run(&[Subtask::new("expensive task")]).await.unwrap_err();

        assert!(matches!(err, AgentError::BudgetExceeded { .. }));
        assert_eq!(*orch.state(), RunState::Failed);
        // 触顶前折入的条目保留：user + 一条 agent
        assert_eq!(orch.ledger().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_inter_task_delay() {
        let backend = Arc::new(MockAgentBackend::scripted(vec![
            ok_run(vec![OutputItem::message("first")]),
            ok_run(vec![OutputItem::message("second")]),
        ]));
        let token = CancellationToken::new();
        let mut orch = Orchestrator::new(backend.clone(), token.clone())
            .with_inter_task_delay(Duration::from_secs(30));

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let subtasks = vec![Subtask::new("task 1"), Subtask::new("task 2")];
        let err = orch.run(&subtasks).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(*orch.state(), RunState::Cancelled);
        assert_eq!(backend.calls(), 1);
    }
}
