//! 历史层：只追加对话账本与智能体输出项类型

pub mod items;
pub mod ledger;

pub use items::{OutputItem, RunIncrement};
pub use ledger::{HistoryLedger, Turn, TurnContent, TurnRole};
