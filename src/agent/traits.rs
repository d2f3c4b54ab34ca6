//! 智能体会话抽象
//!
//! 所有后端（远程 CUA 服务 / Mock）实现 AgentBackend：run 提交当前账本快照，
//! 返回惰性增量流。流只可消费一次、按到达顺序消费；二次消费行为未定义。
//! 挂起只发生在等待下一增量时；一次 run 内部无并行。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::AgentError;
use crate::history::{RunIncrement, Turn};

/// 单次消费的增量流；预算触顶以 Err(BudgetExceeded) 出现后流即结束
pub type IncrementStream = Pin<Box<dyn Stream<Item = Result<RunIncrement, AgentError>> + Send>>;

/// 智能体会话 trait：提交含最新用户条目的完整历史，流式取回输出增量
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn run(&self, history: &[Turn]) -> Result<IncrementStream, AgentError>;
}
