//! Sortie 沙箱服务
//!
//! 对外提供 `POST /execute`：每条命令在一个新建的一次性容器中执行，执行完立即销毁。
//! 启动时检查 Docker 是否可达，不可达直接退出。
//!
//! 启动: cargo run --bin sortie-sandbox --features server -- --config config/local.toml

/// 一次性容器命令执行服务
#[cfg(feature = "server")]
#[derive(Debug, clap::Parser)]
#[command(name = "sortie-sandbox", version, about)]
struct Args {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use clap::Parser;
    use sortie::config::load_config;
    use sortie::core::ShutdownManager;
    use sortie::sandbox::server::{create_router, SandboxServerState};
    use sortie::sandbox::{DockerPlatform, EphemeralEnvironmentManager, SshConnector};

    sortie::observability::init_stderr()?;

    let args = Args::parse();
    let cfg = load_config(args.config).context("Failed to load configuration")?;

    let platform = DockerPlatform::connect(&cfg.sandbox)
        .await
        .context("Could not connect to Docker")?;
    let connector = SshConnector::new(
        cfg.sandbox.ssh_user.clone(),
        &cfg.sandbox.ssh_key,
        Duration::from_secs(cfg.sandbox.connect_timeout_secs),
    );
    let manager = EphemeralEnvironmentManager::from_config(
        Arc::new(platform),
        Arc::new(connector),
        &cfg.sandbox,
    );

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();
    let token = shutdown.token();

    let state = Arc::new(SandboxServerState {
        executor: Arc::new(manager),
        shutdown: token.clone(),
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(cfg.server.bind.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!("Sortie sandbox server listening on http://{}", cfg.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(not(feature = "server"))]
fn main() {
    eprintln!("请使用 --features server 编译: cargo run --bin sortie-sandbox --features server");
    std::process::exit(1);
}

#[cfg(all(test, feature = "server"))]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_config_flag_is_optional() {
        let args = Args::try_parse_from(["sortie-sandbox"]).unwrap();
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["sortie-sandbox", "--config", "config/local.toml"]).unwrap();
        assert_eq!(
            args.config.as_deref(),
            Some(std::path::Path::new("config/local.toml"))
        );
    }
}
