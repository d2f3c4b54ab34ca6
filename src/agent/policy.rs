//! 会话运行策略
//!
//! 构造 Agent 会话时传入一次，会话生命周期内不可变。

/// 每会话运行策略：上下文截图保留数、预算上限、提示词缓存、日志详细度
#[derive(Clone, Debug)]
pub struct RunPolicy {
    /// 请求载荷中保留最近多少个带截图的动作结果，更旧的在发送前被裁剪（控制 token 开销）
    pub max_recent_images: usize,
    /// 累计费用（USD）超过即中止本次 run，不重试
    pub budget_ceiling: Option<f64>,
    /// 是否允许供应商复用先前上下文以降低成本与延迟
    pub prompt_cache_enabled: bool,
    /// 日志详细度指令（RUST_LOG 未设置时的默认值）
    pub verbosity: String,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_recent_images: 3,
            budget_ceiling: Some(1.0),
            prompt_cache_enabled: true,
            verbosity: "info".to_string(),
        }
    }
}

impl RunPolicy {
    pub fn with_max_recent_images(mut self, n: usize) -> Self {
        self.max_recent_images = n;
        self
    }

    pub fn with_budget_ceiling(mut self, ceiling: Option<f64>) -> Self {
        self.budget_ceiling = ceiling;
        self
    }

    pub fn with_prompt_cache(mut self, enabled: bool) -> Self {
        self.prompt_cache_enabled = enabled;
        self
    }
}
