//! Sortie 任务 CLI
//!
//! 入口：初始化日志、加载并校验配置、组装决策端与沙箱执行器，然后运行任务状态机。
//!
//! 启动: cargo run -- "Find the web server on example.com and see its homepage."

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sortie::config::load_config;
use sortie::core::{AgentError, ShutdownManager};
use sortie::llm::OpenAiClient;
use sortie::mission::{MissionStateMachine, StdinOperator};
use sortie::oracle::LlmOracle;
use sortie::sandbox::{
    CommandExecutor, DockerPlatform, EphemeralEnvironmentManager, RemoteSandbox, SshConnector,
};
use sortie::tools::default_registry;

/// 计划驱动的自主任务智能体
#[derive(Debug, Parser)]
#[command(name = "sortie", version, about)]
struct Args {
    /// 任务的高层目标
    goal: String,

    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg = load_config(args.config.clone()).context("Failed to load configuration")?;
    let log_path = sortie::observability::init(&cfg.app.results_root)
        .context("Failed to initialize logging")?;
    cfg.validate()?;

    let base_url = cfg.llm.base_url.as_deref();
    let model = cfg.llm.model.as_deref().unwrap_or_default();
    tracing::info!(log = %log_path.display(), "--- Sortie Agent Initializing ---");
    tracing::info!("--- Using LLM: {} ---", model);
    tracing::warn!("SECURITY WARNING: This agent executes AI-generated commands in remote sandboxes.");

    let registry = default_registry().context("Failed to register capabilities")?;
    let llm = Arc::new(OpenAiClient::new(base_url, model, cfg.llm.api_key.as_deref()));
    let oracle = LlmOracle::new(
        llm,
        &registry.manifest(),
        Duration::from_secs(cfg.llm.timeouts.request),
    )
    .with_action_temperature(cfg.llm.temperature_action);

    let executor: Arc<dyn CommandExecutor> = match cfg.sandbox.remote_url.as_deref() {
        Some(url) => {
            tracing::info!("Using remote sandbox service at {}", url);
            Arc::new(RemoteSandbox::new(
                url,
                Duration::from_secs(cfg.sandbox.exec_timeout_secs),
            ))
        }
        None => {
            let platform = DockerPlatform::connect(&cfg.sandbox)
                .await
                .context("Could not connect to the container platform")?;
            let connector = SshConnector::new(
                cfg.sandbox.ssh_user.clone(),
                &cfg.sandbox.ssh_key,
                Duration::from_secs(cfg.sandbox.connect_timeout_secs),
            );
            Arc::new(EphemeralEnvironmentManager::from_config(
                Arc::new(platform),
                Arc::new(connector),
                &cfg.sandbox,
            ))
        }
    };

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let machine = MissionStateMachine::new(
        args.goal,
        Arc::new(oracle),
        registry,
        executor,
        Arc::new(StdinOperator),
        cfg.app.results_root.clone(),
    )
    .with_max_steps(cfg.app.max_steps)
    .with_cancellation(shutdown.token());

    match machine.initialize_mission().await {
        Ok(()) => {}
        Err(AgentError::Cancelled) => {
            tracing::warn!("Mission interrupted before start.");
            exit_after_interrupt(&shutdown);
        }
        Err(e) => return Err(e.into()),
    }
    let report = machine.run().await?;

    match &report.report_path {
        Some(path) => tracing::info!(outcome = %report.outcome, "--- Mission Concluded --- report: {}", path.display()),
        None => tracing::info!(outcome = %report.outcome, "--- Mission Concluded ---"),
    }
    if shutdown.is_shutdown() {
        exit_after_interrupt(&shutdown);
    }
    Ok(())
}

/// 中断后直接退出：阻塞中的 stdin 读取不会让运行时等待下去
fn exit_after_interrupt(shutdown: &ShutdownManager) -> ! {
    if let Some(reason) = shutdown.reason() {
        tracing::warn!("Shutdown requested: {:?}", reason);
    }
    std::process::exit(130)
}
