//! Hornet - 云端计算机智能体编排器
//!
//! 入口：加载配置与日志，校验必需凭证，开通远程沙箱，构造 Agent 会话，
//! 按序执行配置中的子任务并将运行事件还原为操作者控制台输出。
//! 退出码：0 成功，1 失败，130 用户取消。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;

use hornet::agent::{AgentBackend, CuaAgentSession, MockAgentBackend};
use hornet::computer::ComputerProvisioner;
use hornet::config::{load_config, validate_required_env, AppConfig, REQUIRED_ENV_KEYS};
use hornet::core::{AgentError, Orchestrator, RunEvent, RunSummary, SessionSupervisor, Subtask};

#[tokio::main]
async fn main() {
    let cfg = load_config(None).unwrap_or_else(|e| {
        eprintln!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    if let Err(e) = init_tracing(&cfg) {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    match orchestrate(cfg).await {
        Ok(summary) => {
            println!(
                "\nRun {} finished: {} tasks, {} messages, {} action calls, {} action results, {:.4} USD",
                summary.run_id,
                summary.reports.len(),
                summary.totals.messages,
                summary.totals.action_calls,
                summary.totals.action_results,
                summary.totals.cost
            );
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("Run cancelled by user");
            std::process::exit(130);
        }
        Err(e) => {
            tracing::error!("Orchestration failed: {}", e);
            eprintln!("Error running orchestration: {}", e);
            std::process::exit(1);
        }
    }
}

/// 日志：默认级别取 policy.verbosity，可通过 RUST_LOG 覆盖
fn init_tracing(cfg: &AppConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let directive: tracing_subscriber::filter::Directive = cfg
        .policy
        .verbosity
        .parse()
        .with_context(|| format!("invalid verbosity directive: {}", cfg.policy.verbosity))?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(fmt::layer())
        .init();
    Ok(())
}

/// 一次完整编排：凭证闸门 -> 沙箱开通 -> 会话构造 -> 主控循环
async fn orchestrate(cfg: AppConfig) -> Result<RunSummary, AgentError> {
    let supervisor = Arc::new(SessionSupervisor::new());
    supervisor.install_ctrl_c_handler();

    let backend = build_backend(&cfg).await?;

    let subtasks: Vec<Subtask> = cfg.tasks.iter().map(|t| t.to_subtask()).collect();
    if subtasks.is_empty() {
        tracing::warn!("No tasks configured ([[tasks]] in config/default.toml), nothing to do");
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let printer = tokio::spawn(print_events(event_rx));

    let mut orchestrator = Orchestrator::new(backend, supervisor.cancel_token())
        .with_inter_task_delay(Duration::from_secs(cfg.app.inter_task_delay_secs))
        .with_event_tx(event_tx);

    let result = orchestrator.run(&subtasks).await;

    // 丢弃编排器（连同事件发送端）让打印任务收尾，保证输出顺序完整
    drop(orchestrator);
    let _ = printer.await;
    result
}

/// 根据配置选择后端：mock 仅供无凭证本地试跑；cua 先过凭证闸门再发起任何远程调用
async fn build_backend(cfg: &AppConfig) -> Result<Arc<dyn AgentBackend>, AgentError> {
    if cfg.agent.backend.eq_ignore_ascii_case("mock") {
        tracing::warn!("Using mock agent backend, no remote calls will be made");
        return Ok(Arc::new(MockAgentBackend::new()));
    }

    validate_required_env(&REQUIRED_ENV_KEYS)?;

    // 闸门已保证三个键存在且非空
    let cua_api_key = std::env::var("CUA_API_KEY").unwrap_or_default();
    let sandbox_name = std::env::var("CUA_SANDBOX_NAME").unwrap_or_default();
    let model_api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();

    let provisioner = ComputerProvisioner::new(
        &cfg.computer.base_url,
        &cua_api_key,
        cfg.computer.provision_timeout_secs,
    )?;
    let computer = provisioner
        .provision(cfg.computer.os_type, &sandbox_name, cfg.computer.provider_type)
        .await?;

    let session = CuaAgentSession::new(
        &cfg.agent.base_url,
        &cua_api_key,
        &model_api_key,
        &cfg.agent.model,
        &computer,
        cfg.policy.to_policy(),
        cfg.agent.request_timeout_secs,
    )?;
    Ok(Arc::new(session))
}

/// 消费运行事件并还原控制台输出（顺序契约：任务开始 -> 逐项分类 -> 完成标记）
async fn print_events(mut rx: mpsc::UnboundedReceiver<RunEvent>) {
    while let Some(ev) = rx.recv().await {
        match ev {
            RunEvent::TaskStarted {
                index,
                total,
                instruction,
            } => {
                println!("\nExecuting task {}/{}: {}", index + 1, total, instruction);
            }
            RunEvent::AgentMessage { text } => println!("Agent: {}", text),
            RunEvent::ActionIssued {
                action_type,
                preview,
            } => println!("Computer Action: {}({})", action_type, preview),
            RunEvent::ActionObserved => println!("Computer Output: [Screenshot/Result]"),
            RunEvent::IncrementFolded { .. } => {}
            RunEvent::TaskCompleted {
                index,
                total,
                report,
            } => {
                println!(
                    "✅ Task {}/{} completed ({} messages, {} actions, {} results)",
                    index + 1,
                    total,
                    report.messages,
                    report.action_calls,
                    report.action_results
                );
            }
            RunEvent::RunFailed { text } => println!("Run failed: {}", text),
        }
    }
}
