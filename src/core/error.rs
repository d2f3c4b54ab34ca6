//! 编排错误类型
//!
//! 全部错误上浮到 Orchestrator：记日志后继续向进程入口传播，入口打印简短摘要并以非零码退出。
//! 重试归操作者（整段重跑），Agent 会话与编排器都不做跨子任务的自动重试。

use thiserror::Error;

/// 一次编排运行中可能出现的错误（凭证、开通、远端通道、预算、取消）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 必需环境变量缺失；一次性列出全部缺失键，便于操作者一轮修完
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Configuration(Vec<String>),

    #[error("Sandbox provisioning failed: {0}")]
    Provisioning(String),

    /// 远端调用的瞬时故障（超时、连接失败、限流）
    #[error("Transient agent failure: {0}")]
    Transient(String),

    /// 预算上限触发的主动停止，与一般失败区分上报
    #[error("Budget ceiling exceeded: spent {spent:.4} USD of {ceiling:.4} USD")]
    BudgetExceeded { spent: f64, ceiling: f64 },

    /// 远端通道的其它失败（兜底）
    #[error("Agent session error: {0}")]
    Session(String),

    /// 用户主动取消，不算失败
    #[error("Cancelled by user")]
    Cancelled,
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
