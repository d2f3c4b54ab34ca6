//! 子任务执行：流式折叠
//!
//! 追加用户条目 -> 对账本快照发起 run -> 每个增量折为一条 agent 条目并按类分类计数。
//! 折叠是全量的：零输出项的增量同样追加一条空内容条目，不做条件跳过。
//! 成败语义由调用方依据账本内容判断，这里只做结构分类，不解读任务是否真正完成。

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use futures_util::StreamExt;

use crate::agent::AgentBackend;
use crate::core::events::{send_event, RunEvent};
use crate::core::AgentError;
use crate::history::{HistoryLedger, OutputItem, Turn};

/// 智能体消息在事件里的预览最大字符数
const MESSAGE_PREVIEW_CHARS: usize = 800;
/// 动作 payload 预览最大字符数
const ACTION_PREVIEW_CHARS: usize = 200;

/// 一个不可变的子任务：指令文本与可选约束说明
#[derive(Clone, Debug)]
pub struct Subtask {
    pub instruction: String,
    pub constraint: Option<String>,
}

impl Subtask {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            constraint: None,
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// 写入账本的用户条目文本：指令 + 可选约束
    pub fn user_text(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{}\n\nConstraint: {}", self.instruction, c),
            None => self.instruction.clone(),
        }
    }
}

/// 单个子任务的结构化分类统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TaskReport {
    pub messages: usize,
    pub action_calls: usize,
    pub action_results: usize,
    pub increments: usize,
    /// 供应商上报的累计费用（USD）
    pub cost: f64,
}

impl TaskReport {
    fn record(&mut self, item: &OutputItem) {
        match item {
            OutputItem::Message { .. } => self.messages += 1,
            OutputItem::ActionCall { .. } => self.action_calls += 1,
            OutputItem::ActionResult { .. } => self.action_results += 1,
        }
    }

    pub fn merge(&mut self, other: &TaskReport) {
        self.messages += other.messages;
        self.action_calls += other.action_calls;
        self.action_results += other.action_results;
        self.increments += other.increments;
        self.cost += other.cost;
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    let p: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        format!("{}...", p)
    } else {
        p
    }
}

/// 执行一个子任务：唯一副作用是账本追加；增量序列耗尽后返回分类报告
pub async fn execute(
    backend: &dyn AgentBackend,
    ledger: &mut HistoryLedger,
    subtask: &Subtask,
    cancel_token: &CancellationToken,
    event_tx: Option<&UnboundedSender<RunEvent>>,
) -> Result<TaskReport, AgentError> {
    if cancel_token.is_cancelled() {
        return Err(AgentError::Cancelled);
    }

    ledger.append(Turn::user(subtask.user_text()));

    let mut stream = backend.run(ledger.snapshot()).await?;
    let mut report = TaskReport::default();

    loop {
        let next = tokio::select! {
            _ = cancel_token.cancelled() => {
                return Err(AgentError::Cancelled);
            }
            next = stream.next() => next,
        };

        let increment = match next {
            Some(Ok(inc)) => inc,
            Some(Err(e)) => {
                tracing::error!("Agent stream failed on subtask: {}", e);
                return Err(e);
            }
            None => break,
        };

        for item in &increment.items {
            report.record(item);
            match item {
                OutputItem::Message { text } => {
                    send_event(
                        event_tx,
                        RunEvent::AgentMessage {
                            text: preview(text, MESSAGE_PREVIEW_CHARS),
                        },
                    );
                }
                OutputItem::ActionCall {
                    action_type,
                    payload,
                } => {
                    send_event(
                        event_tx,
                        RunEvent::ActionIssued {
                            action_type: action_type.clone(),
                            preview: preview(&payload.to_string(), ACTION_PREVIEW_CHARS),
                        },
                    );
                }
                OutputItem::ActionResult { .. } => {
                    send_event(event_tx, RunEvent::ActionObserved);
                }
            }
        }

        report.increments += 1;
        if let Some(c) = increment.cost {
            report.cost += c;
        }
        send_event(
            event_tx,
            RunEvent::IncrementFolded {
                items: increment.items.len(),
            },
        );

        // 一个增量的全部输出项折为一条 agent 条目
        ledger.append(Turn::agent(increment.items));
    }

    Ok(report)
}
