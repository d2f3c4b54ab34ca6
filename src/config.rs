//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HORNET__*` 覆盖（双下划线表示嵌套，
//! 如 `HORNET__AGENT__MODEL=...`）。必需凭证（CUA / 模型供应商）单独走
//! validate_required_env：在任何远程调用发起前校验，一次性列出全部缺失键。

use std::path::PathBuf;

use serde::Deserialize;

use crate::agent::RunPolicy;
use crate::computer::{OsType, ProviderType};
use crate::core::task_runner::Subtask;
use crate::core::AgentError;

/// 建立会话前必须存在且非空的环境变量
pub const REQUIRED_ENV_KEYS: [&str; 3] = ["CUA_API_KEY", "CUA_SANDBOX_NAME", "OPENAI_API_KEY"];

/// 返回缺失（未设置或全空白）的键，保持传入顺序
pub fn missing_env_keys(keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter(|k| std::env::var(k).map(|v| v.trim().is_empty()).unwrap_or(true))
        .map(|k| k.to_string())
        .collect()
}

/// 凭证闸门：任何键缺失即失败，并在错误中列出全部缺失键
pub fn validate_required_env(keys: &[&str]) -> Result<(), AgentError> {
    let missing = missing_env_keys(keys);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AgentError::Configuration(missing))
    }
}

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub computer: ComputerSection,
    #[serde(default)]
    pub policy: PolicySection,
    /// 顺序执行的子任务列表（[[tasks]]）
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

/// [app] 段：应用名与任务间延时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 子任务之间的固定延时（秒），对远端环境的限速礼让
    #[serde(default = "default_inter_task_delay_secs")]
    pub inter_task_delay_secs: u64,
}

fn default_inter_task_delay_secs() -> u64 {
    2
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            inter_task_delay_secs: default_inter_task_delay_secs(),
        }
    }
}

/// [agent] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 后端：cua / mock（mock 不经凭证闸门，仅供本地试跑）
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_service_base_url")]
    pub base_url: String,
    /// 单步增量请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend() -> String {
    "cua".to_string()
}

fn default_model() -> String {
    "openai/computer-use-preview".to_string()
}

fn default_service_base_url() -> String {
    "https://api.cua.ai".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            base_url: default_service_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// [computer] 段：沙箱开通参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComputerSection {
    #[serde(default = "default_service_base_url")]
    pub base_url: String,
    #[serde(default = "default_os_type")]
    pub os_type: OsType,
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,
}

fn default_os_type() -> OsType {
    OsType::Linux
}

fn default_provider_type() -> ProviderType {
    ProviderType::Cloud
}

fn default_provision_timeout_secs() -> u64 {
    60
}

impl Default for ComputerSection {
    fn default() -> Self {
        Self {
            base_url: default_service_base_url(),
            os_type: default_os_type(),
            provider_type: default_provider_type(),
            provision_timeout_secs: default_provision_timeout_secs(),
        }
    }
}

/// [policy] 段：会话运行策略（构造 Agent 会话后不可变）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    #[serde(default = "default_max_recent_images")]
    pub max_recent_images: usize,
    #[serde(default = "default_budget_ceiling")]
    pub budget_ceiling: Option<f64>,
    #[serde(default = "default_prompt_cache_enabled")]
    pub prompt_cache_enabled: bool,
    #[serde(default = "default_verbosity")]
    pub verbosity: String,
}

fn default_max_recent_images() -> usize {
    3
}

fn default_budget_ceiling() -> Option<f64> {
    Some(1.0)
}

fn default_prompt_cache_enabled() -> bool {
    true
}

fn default_verbosity() -> String {
    "info".to_string()
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            max_recent_images: default_max_recent_images(),
            budget_ceiling: default_budget_ceiling(),
            prompt_cache_enabled: default_prompt_cache_enabled(),
            verbosity: default_verbosity(),
        }
    }
}

impl PolicySection {
    pub fn to_policy(&self) -> RunPolicy {
        RunPolicy {
            max_recent_images: self.max_recent_images,
            budget_ceiling: self.budget_ceiling,
            prompt_cache_enabled: self.prompt_cache_enabled,
            verbosity: self.verbosity.clone(),
        }
    }
}

/// [[tasks]] 条目：指令与可选约束
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub instruction: String,
    #[serde(default)]
    pub constraint: Option<String>,
}

impl TaskEntry {
    pub fn to_subtask(&self) -> Subtask {
        let subtask = Subtask::new(self.instruction.clone());
        match &self.constraint {
            Some(c) => subtask.with_constraint(c.clone()),
            None => subtask,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            agent: AgentSection::default(),
            computer: ComputerSection::default(),
            policy: PolicySection::default(),
            tasks: Vec::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HORNET__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HORNET__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HORNET")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
