//! 可观测性：日志同时写 stderr 与 `<results_root>/logs/agent_run.log`（每次运行覆盖）

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_NAME: &str = "agent_run.log";

/// 默认 info，可通过 RUST_LOG 覆盖；返回日志文件路径
pub fn init(results_root: &Path) -> anyhow::Result<PathBuf> {
    let logs_dir = results_root.join("logs");
    std::fs::create_dir_all(&logs_dir)?;
    let log_path = logs_dir.join(LOG_FILE_NAME);
    let file = File::create(&log_path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;

    Ok(log_path)
}

/// 只输出到 stderr（sortie-sandbox 服务使用）
pub fn init_stderr() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
