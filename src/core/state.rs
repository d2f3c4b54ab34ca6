//! 运行状态机
//!
//! 每次编排运行：Init -> Validating -> Provisioned -> Running(i) -> ... -> Done；
//! 任一 Running(i) 可旁路转入 Failed（未恢复错误）或 Cancelled（外部取消）。
//! Done / Failed / Cancelled 为终态。

use std::fmt;

use serde::Serialize;

/// 一次编排运行所处的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Validating,
    Provisioned,
    /// 正在执行第 i 个子任务（0 起）
    Running(usize),
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Validating => write!(f, "validating"),
            Self::Provisioned => write!(f, "provisioned"),
            Self::Running(i) => write!(f, "running({})", i),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
