//! 运行过程事件：供控制台/前端按序展示任务进度与分类输出
//!
//! 顺序契约：TaskStarted -> 若干 item 级事件与 IncrementFolded -> TaskCompleted，
//! 操作者工具可以依赖这一顺序。

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::task_runner::TaskReport;

/// 单次编排运行的过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 开始执行第 index+1 / total 个子任务
    TaskStarted {
        index: usize,
        total: usize,
        instruction: String,
    },
    /// 智能体的自然语言输出（预览，避免过长）
    AgentMessage { text: String },
    /// 智能体发起环境动作
    ActionIssued {
        action_type: String,
        preview: String,
    },
    /// 观察到动作结果（截图等，内容不透明，不展示 payload）
    ActionObserved,
    /// 一个增量折入账本（含空增量）
    IncrementFolded { items: usize },
    /// 子任务完成与其结构化分类统计
    TaskCompleted {
        index: usize,
        total: usize,
        report: TaskReport,
    },
    /// 运行失败（取消不经此事件上报）
    RunFailed { text: String },
}

pub(crate) fn send_event(tx: Option<&UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
