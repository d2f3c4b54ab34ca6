//! 只追加对话账本
//!
//! 一次编排运行内所有子任务共享同一账本：用户指令与智能体输出按到达顺序追加，
//! 既有条目不重排不删除；传给子任务 n+1 的账本必须恰好是子任务 n 结束后的状态，
//! 这是智能体跨子任务保持上下文连续性的前提。上下文窗口裁剪不在这里做，
//! 由 Agent 会话的 RunPolicy（max_recent_images）负责。

use serde::{Deserialize, Serialize};

use crate::history::OutputItem;

/// 账本条目角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Agent,
}

/// 条目内容：用户侧为自由文本，智能体侧为一个增量的全部输出项
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Items(Vec<OutputItem>),
}

/// 单条账本条目，追加后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: TurnContent,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: TurnContent::Text(content.into()),
        }
    }

    pub fn agent(items: Vec<OutputItem>) -> Self {
        Self {
            role: TurnRole::Agent,
            content: TurnContent::Items(items),
        }
    }
}

/// 只追加账本：append O(1)，snapshot 返回全量有序条目用于回放到下一次 run 调用
#[derive(Clone, Debug, Default)]
pub struct HistoryLedger {
    turns: Vec<Turn>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
