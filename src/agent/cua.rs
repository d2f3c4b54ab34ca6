//! 远程 CUA 服务客户端
//!
//! 每次 run 将账本快照序列化为 wire 历史，循环 POST /v1/agent/turns 取回增量，
//! 直到远端报告 done；请求额外携带本次 run 内已产出的 turn_output，远端据此无状态续算。
//! wire 输出项词表为 message / computer_call / computer_call_output，
//! 在此边界转换为核心的封闭 OutputItem；未知类型记日志并跳过。
//! 预算：累计 usage.cost 超过 RunPolicy.budget_ceiling 时产出 BudgetExceeded 并结束流。

use futures_util::stream;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use async_trait::async_trait;

use crate::agent::{AgentBackend, IncrementStream, RunPolicy};
use crate::computer::Computer;
use crate::core::AgentError;
use crate::history::{OutputItem, RunIncrement, Turn, TurnContent, TurnRole};

/// 远端返回的单步增量
#[derive(Debug, Deserialize)]
struct WireIncrement {
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    cost: Option<f64>,
}

/// 远程智能体会话：模型、沙箱句柄与运行策略在构造时绑定，会话期内不可变
pub struct CuaAgentSession {
    client: Client,
    base_url: String,
    api_key: String,
    /// 模型供应商密钥，随请求转发给远端服务
    model_api_key: String,
    model: String,
    sandbox_id: String,
    policy: RunPolicy,
}

impl CuaAgentSession {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model_api_key: &str,
        model: &str,
        computer: &Computer,
        policy: RunPolicy,
        request_timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| AgentError::Session(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_api_key: model_api_key.to_string(),
            model: model.to_string(),
            sandbox_id: computer.id.clone(),
            policy,
        })
    }
}

/// 增量流在各步之间携带的状态
struct StepState {
    client: Client,
    url: String,
    api_key: String,
    body_base: Value,
    /// 本次 run 内已取回的 wire 输出项，随请求回传
    turn_output: Vec<Value>,
    spent: f64,
    ceiling: Option<f64>,
    done: bool,
}

#[async_trait]
impl AgentBackend for CuaAgentSession {
    async fn run(&self, history: &[Turn]) -> Result<IncrementStream, AgentError> {
        // max_recent_images == 0 表示不裁剪
        let pruned = if self.policy.max_recent_images > 0 {
            prune_history_images(history, self.policy.max_recent_images)
        } else {
            history.to_vec()
        };
        let wire_history: Vec<Value> = pruned.iter().map(turn_to_wire).collect();

        let state = StepState {
            client: self.client.clone(),
            url: format!("{}/v1/agent/turns", self.base_url),
            api_key: self.api_key.clone(),
            body_base: json!({
                "model": self.model,
                "sandbox_id": self.sandbox_id,
                "history": wire_history,
                "prompt_cache": self.policy.prompt_cache_enabled,
                "model_api_key": self.model_api_key,
            }),
            turn_output: Vec::new(),
            spent: 0.0,
            ceiling: self.policy.budget_ceiling,
            done: false,
        };

        Ok(Box::pin(stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            match fetch_step(&mut st).await {
                Ok(inc) => Some((Ok(inc), st)),
                Err(e) => {
                    // 任何错误都终结本流：重试不属于会话层
                    st.done = true;
                    Some((Err(e), st))
                }
            }
        })))
    }
}

/// 单步请求：POST 当前历史与已产出项，解析一条增量并做预算检查
async fn fetch_step(st: &mut StepState) -> Result<RunIncrement, AgentError> {
    let mut body = st.body_base.clone();
    body["turn_output"] = Value::Array(st.turn_output.clone());

    let resp = st
        .client
        .post(&st.url)
        .bearer_auth(&st.api_key)
        .json(&body)
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let snippet: String = text.chars().take(200).collect();
        return Err(if status.as_u16() == 429 || status.is_server_error() {
            AgentError::Transient(format!("agent endpoint returned {}: {}", status, snippet))
        } else {
            AgentError::Session(format!("agent endpoint returned {}: {}", status, snippet))
        });
    }

    let wire: WireIncrement = resp
        .json()
        .await
        .map_err(|e| AgentError::Session(format!("invalid increment payload: {}", e)))?;

    st.done = wire.done;
    st.turn_output.extend(wire.output.iter().cloned());

    let items: Vec<OutputItem> = wire.output.iter().filter_map(item_from_wire).collect();
    let cost = wire.usage.and_then(|u| u.cost);

    if let Some(c) = cost {
        st.spent += c;
    }
    if let Some(ceiling) = st.ceiling {
        if st.spent > ceiling {
            return Err(AgentError::BudgetExceeded {
                spent: st.spent,
                ceiling,
            });
        }
    }

    Ok(RunIncrement { items, cost })
}

/// 超时 / 连接失败归为瞬时错误，其余归会话错误
fn classify_transport_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() || e.is_connect() {
        AgentError::Transient(e.to_string())
    } else {
        AgentError::Session(e.to_string())
    }
}

/// wire 输出项 -> 核心 OutputItem；未知类型返回 None（记日志跳过）
fn item_from_wire(v: &Value) -> Option<OutputItem> {
    match v.get("type").and_then(Value::as_str) {
        Some("message") => {
            // content 为分段数组，拼接各段 text
            let text = v
                .get("content")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            Some(OutputItem::message(text))
        }
        Some("computer_call") => {
            let action = v.get("action").cloned().unwrap_or(Value::Null);
            let action_type = action
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            Some(OutputItem::action_call(action_type, action))
        }
        Some("computer_call_output") => {
            let output = v.get("output").cloned().unwrap_or(Value::Null);
            Some(OutputItem::action_result(output))
        }
        other => {
            tracing::warn!("Skipping unrecognized output item kind: {:?}", other);
            None
        }
    }
}

/// 核心 OutputItem -> wire 输出项（回放历史时使用）
fn item_to_wire(item: &OutputItem) -> Value {
    match item {
        OutputItem::Message { text } => json!({
            "type": "message",
            "content": [{ "text": text }],
        }),
        OutputItem::ActionCall { payload, .. } => json!({
            "type": "computer_call",
            "action": payload,
        }),
        OutputItem::ActionResult { payload } => json!({
            "type": "computer_call_output",
            "output": payload,
        }),
    }
}

fn turn_to_wire(turn: &Turn) -> Value {
    match (&turn.role, &turn.content) {
        (TurnRole::User, TurnContent::Text(text)) => json!({
            "role": "user",
            "content": text,
        }),
        (TurnRole::User, TurnContent::Items(items)) => json!({
            "role": "user",
            "output": items.iter().map(item_to_wire).collect::<Vec<_>>(),
        }),
        (TurnRole::Agent, TurnContent::Items(items)) => json!({
            "role": "agent",
            "output": items.iter().map(item_to_wire).collect::<Vec<_>>(),
        }),
        (TurnRole::Agent, TurnContent::Text(text)) => json!({
            "role": "agent",
            "content": text,
        }),
    }
}

/// 动作结果是否带截图（裁剪的判定依据）
fn is_image_result(item: &OutputItem) -> bool {
    match item {
        OutputItem::ActionResult { payload } => {
            payload.get("image_url").is_some()
                || payload.get("screenshot").is_some()
                || payload.get("type").and_then(Value::as_str) == Some("input_image")
        }
        _ => false,
    }
}

/// 只保留最近 max 个带截图的动作结果，更旧的替换为占位标记；账本本身不受影响，
/// 仅作用于发送给远端的请求副本
fn prune_history_images(history: &[Turn], max: usize) -> Vec<Turn> {
    let mut seen = 0usize;
    let mut out: Vec<Turn> = history
        .iter()
        .rev()
        .map(|turn| match &turn.content {
            TurnContent::Items(items) => {
                let pruned: Vec<OutputItem> = items
                    .iter()
                    .rev()
                    .map(|item| {
                        if is_image_result(item) {
                            seen += 1;
                            if seen > max {
                                return OutputItem::action_result(json!({
                                    "omitted": "screenshot pruned from context",
                                }));
                            }
                        }
                        item.clone()
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                Turn {
                    role: turn.role,
                    content: TurnContent::Items(pruned),
                }
            }
            TurnContent::Text(_) => turn.clone(),
        })
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_from_wire_message_concatenates_parts() {
        let v = json!({
            "type": "message",
            "content": [{ "text": "Hello " }, { "text": "world" }],
        });
        match item_from_wire(&v) {
            Some(OutputItem::Message { text }) => assert_eq!(text, "Hello world"),
            other => panic!("Expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_item_from_wire_computer_call() {
        let v = json!({
            "type": "computer_call",
            "action": { "type": "click", "x": 3, "y": 4 },
        });
        match item_from_wire(&v) {
            Some(OutputItem::ActionCall {
                action_type,
                payload,
            }) => {
                assert_eq!(action_type, "click");
                assert_eq!(payload["x"], 3);
            }
            other => panic!("Expected action call, got {:?}", other),
        }
    }

    #[test]
    fn test_item_from_wire_skips_unknown_kind() {
        let v = json!({ "type": "reasoning", "summary": "..." });
        assert!(item_from_wire(&v).is_none());
        assert!(item_from_wire(&json!({ "no_type": true })).is_none());
    }

    #[test]
    fn test_prune_keeps_most_recent_images() {
        let screenshot = |n: u32| {
            OutputItem::action_result(json!({ "type": "input_image", "image_url": format!("img-{}", n) }))
        };
        let history = vec![
            Turn::user("task 1"),
            Turn::agent(vec![screenshot(1)]),
            Turn::user("task 2"),
            Turn::agent(vec![screenshot(2), screenshot(3)]),
        ];

        let pruned = prune_history_images(&history, 2);
        // 最旧的 screenshot(1) 被替换为占位
        match &pruned[1].content {
            TurnContent::Items(items) => match &items[0] {
                OutputItem::ActionResult { payload } => {
                    assert!(payload.get("omitted").is_some());
                }
                other => panic!("Expected action result, got {:?}", other),
            },
            _ => panic!("Expected items"),
        }
        // 最近两个保留
        match &pruned[3].content {
            TurnContent::Items(items) => {
                assert!(is_image_result(&items[0]));
                assert!(is_image_result(&items[1]));
            }
            _ => panic!("Expected items"),
        }
        // 用户条目不受影响
        assert_eq!(pruned[0], history[0]);
    }

    #[test]
    fn test_turn_to_wire_roles() {
        let user = turn_to_wire(&Turn::user("go"));
        assert_eq!(user["role"], "user");
        assert_eq!(user["content"], "go");

        let agent = turn_to_wire(&Turn::agent(vec![OutputItem::message("done")]));
        assert_eq!(agent["role"], "agent");
        assert_eq!(agent["output"][0]["type"], "message");
    }
}
