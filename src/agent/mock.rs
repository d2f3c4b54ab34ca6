//! Mock 智能体后端（用于测试与无凭证本地试跑）
//!
//! 默认行为：取最后一条用户条目，回显为一条 Message 增量。
//! scripted 模式按 run 调用顺序弹出预排好的增量脚本，并记录调用次数，
//! 供 fail-fast / 取消等编排测试断言「后续子任务未被调用」。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::agent::{AgentBackend, IncrementStream};
use crate::core::AgentError;
use crate::history::{OutputItem, RunIncrement, Turn, TurnContent, TurnRole};

/// 一次 run 调用的脚本
pub enum ScriptedRun {
    /// 依次产出这些增量（Err 表示该位置流中断）
    Items(Vec<Result<RunIncrement, AgentError>>),
    /// 永不产出增量，用于模拟「等待远端」以测试取消
    Pending,
}

/// Mock 后端：脚本耗尽（或未设脚本）时回显用户最后一条指令
#[derive(Default)]
pub struct MockAgentBackend {
    script: Mutex<VecDeque<ScriptedRun>>,
    calls: AtomicUsize,
}

impl MockAgentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(runs: Vec<ScriptedRun>) -> Self {
        Self {
            script: Mutex::new(runs.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// run 被调用的累计次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn echo(history: &[Turn]) -> RunIncrement {
        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .and_then(|t| match &t.content {
                TurnContent::Text(s) => Some(s.as_str()),
                TurnContent::Items(_) => None,
            })
            .unwrap_or("(no input)");

        RunIncrement::new(vec![OutputItem::message(format!(
            "Echo from Mock: {}",
            last_user
        ))])
    }
}

#[async_trait]
impl AgentBackend for MockAgentBackend {
    async fn run(&self, history: &[Turn]) -> Result<IncrementStream, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().expect("mock script lock").pop_front();
        match next {
            Some(ScriptedRun::Items(items)) => Ok(Box::pin(stream::iter(items))),
            Some(ScriptedRun::Pending) => Ok(Box::pin(stream::pending())),
            None => Ok(Box::pin(stream::iter(vec![Ok(Self::echo(history))]))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_echo_reflects_last_user_turn() {
        let backend = MockAgentBackend::new();
        let history = vec![Turn::user("open the report")];
        let mut stream = backend.run(&history).await.unwrap();

        let inc = stream.next().await.unwrap().unwrap();
        match &inc.items[0] {
            OutputItem::Message { text } => assert!(text.contains("open the report")),
            other => panic!("Expected message, got {:?}", other),
        }
        assert!(stream.next().await.is_none());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_runs_pop_in_order() {
        let backend = MockAgentBackend::scripted(vec![
            ScriptedRun::Items(vec![Ok(RunIncrement::default())]),
            ScriptedRun::Items(vec![Err(AgentError::Session("boom".to_string()))]),
        ]);

        let mut first = backend.run(&[]).await.unwrap();
        assert!(first.next().await.unwrap().is_ok());

        let mut second = backend.run(&[]).await.unwrap();
        assert!(second.next().await.unwrap().is_err());
        assert_eq!(backend.calls(), 2);
    }
}
