//! 会话监管：取消令牌与 Ctrl+C
//!
//! 持有 CancellationToken，编排器与 Task Runner 在每个挂起点（发起 run 前、增量之间、
//! 任务间延时）检查该 token，因此取消无需真实 OS 信号即可测试；
//! Ctrl+C 处理器只负责打印提示并触发 cancel，不在信号上下文里做任何清理。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：一次编排运行的取消令牌
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（用户 Ctrl+C 或上层决定中止）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单个子任务）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// 安装 Ctrl+C 处理器：打印取消提示并触发 cancel，由运行中的编排循环自行退出
    pub fn install_ctrl_c_handler(self: &Arc<Self>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::warn!("Received Ctrl+C, cancelling orchestrated run...");
                eprintln!("\nCancellation requested, stopping after current increment...");
                supervisor.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_starts_uncancelled() {
        let supervisor = SessionSupervisor::new();
        assert!(!supervisor.is_cancelled());
    }

    #[test]
    fn test_cancel_propagates_to_tokens() {
        let supervisor = SessionSupervisor::new();
        let token = supervisor.cancel_token();
        let child = supervisor.child_token();
        assert!(!token.is_cancelled());

        supervisor.cancel();
        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
    }
}
