//! Hornet - Rust 云端计算机智能体编排器
//!
//! 模块划分：
//! - **agent**: 计算机智能体会话抽象与实现（远程 CUA 服务 / Mock）
//! - **computer**: 远程虚拟机（沙箱）的开通与会话句柄
//! - **config**: 应用配置加载（TOML + 环境变量）与必需凭证校验
//! - **core**: 编排、任务执行、状态机、取消监管、运行事件
//! - **history**: 跨子任务共享的只追加对话账本与输出项类型

pub mod agent;
pub mod computer;
pub mod config;
pub mod core;
pub mod history;
