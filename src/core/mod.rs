//! 核心编排层：错误、状态机、取消监管、子任务执行、主控循环、运行事件

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod state;
pub mod supervisor;
pub mod task_runner;

pub use error::AgentError;
pub use events::RunEvent;
pub use orchestrator::{Orchestrator, RunSummary};
pub use state::RunState;
pub use supervisor::SessionSupervisor;
pub use task_runner::{Subtask, TaskReport};
