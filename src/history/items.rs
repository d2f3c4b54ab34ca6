//! 智能体输出项与流式增量
//!
//! OutputItem 是封闭的 tagged enum（message / action_call / action_result），
//! 分类处统一穷举匹配；远端未知类型在 wire 边界处记日志并跳过，不进入核心类型。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 智能体单个输出项：文本、环境动作请求、动作观察结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    /// 自然语言内容
    Message { text: String },
    /// 环境动作请求（click / type / navigate 等），payload 对核心不透明
    ActionCall { action_type: String, payload: Value },
    /// 先前动作的观察结果（截图、成功/失败标记等）
    ActionResult { payload: Value },
}

impl OutputItem {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    pub fn action_call(action_type: impl Into<String>, payload: Value) -> Self {
        Self::ActionCall {
            action_type: action_type.into(),
            payload,
        }
    }

    pub fn action_result(payload: Value) -> Self {
        Self::ActionResult { payload }
    }
}

/// 流式运行的最小单位：零或多个输出项，附带供应商上报的本步开销
///
/// 由 Agent 会话产出，Task Runner 恰好消费一次，折入账本后即丢弃。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunIncrement {
    #[serde(default)]
    pub items: Vec<OutputItem>,
    /// 本增量产生的费用（USD），用于预算上限检查
    #[serde(default)]
    pub cost: Option<f64>,
}

impl RunIncrement {
    pub fn new(items: Vec<OutputItem>) -> Self {
        Self { items, cost: None }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}
