//! Agent 层：计算机智能体会话抽象与实现（远程 CUA 服务 / Mock）

pub mod cua;
pub mod mock;
pub mod policy;
pub mod traits;

pub use cua::CuaAgentSession;
pub use mock::{MockAgentBackend, ScriptedRun};
pub use policy::RunPolicy;
pub use traits::{AgentBackend, IncrementStream};
