//! 一次性环境管理器（EEM）
//!
//! 每次 execute() 独占一个新实例：创建 → 启动 → 建立通道 → 执行 → 取回输出 → 销毁。
//! 无论第 2~5 步哪里失败，销毁都恰好执行一次；取消也先销毁再返回 Cancelled。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::SandboxSection;
use crate::sandbox::archive::{missing_output_message, unpack_output};
use crate::sandbox::{
    short_id, ChannelConnector, CommandExecutor, ExecutionOutput, RetryPolicy, SandboxChannel,
    SandboxError, SandboxPlatform,
};

/// 文件名主体的最大长度（不含随机后缀）
const MAX_STEM_CHARS: usize = 120;
const AUDIT_PREVIEW_CHARS: usize = 120;

/// 单次执行期间存活的实例；生命周期严格嵌套在一次 execute() 内
struct EphemeralEnvironment {
    id: String,
    channel: Option<Box<dyn SandboxChannel>>,
}

pub struct EphemeralEnvironmentManager {
    platform: Arc<dyn SandboxPlatform>,
    connector: Arc<dyn ChannelConnector>,
    retry: RetryPolicy,
    output_dir: String,
    exec_timeout: Duration,
}

impl EphemeralEnvironmentManager {
    pub fn new(platform: Arc<dyn SandboxPlatform>, connector: Arc<dyn ChannelConnector>) -> Self {
        Self {
            platform,
            connector,
            retry: RetryPolicy::default(),
            output_dir: "/tmp".to_string(),
            exec_timeout: Duration::from_secs(1800),
        }
    }

    pub fn from_config(
        platform: Arc<dyn SandboxPlatform>,
        connector: Arc<dyn ChannelConnector>,
        settings: &SandboxSection,
    ) -> Self {
        Self::new(platform, connector)
            .with_retry(RetryPolicy::new(
                settings.connect_attempts,
                Duration::from_secs(settings.connect_delay_secs),
            ))
            .with_output_dir(settings.output_dir.clone())
            .with_exec_timeout(Duration::from_secs(settings.exec_timeout_secs))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_exec_timeout(mut self, exec_timeout: Duration) -> Self {
        self.exec_timeout = exec_timeout;
        self
    }

    fn output_path(&self, filename: &str) -> String {
        format!("{}/{}", self.output_dir.trim_end_matches('/'), filename)
    }

    /// 第 2~5 步
    async fn drive(
        &self,
        env: &mut EphemeralEnvironment,
        command: &str,
        output_path: &str,
    ) -> Result<String, SandboxError> {
        self.platform.ensure_running(&env.id).await?;
        self.ensure_connected(env).await?;

        let channel = env
            .channel
            .as_ref()
            .ok_or_else(|| SandboxError::Connection("channel not established".to_string()))?;

        let remote = format!("{command} > {output_path} 2>&1");
        tracing::info!(container = %short_id(&env.id), "Executing: {}", remote);
        let exit_status = timeout(self.exec_timeout, channel.run(&remote))
            .await
            .map_err(|_| SandboxError::CommandTimeout(self.exec_timeout.as_secs()))??;
        tracing::info!(
            container = %short_id(&env.id),
            exit_status = ?exit_status,
            "Remote command finished"
        );

        match self.platform.fetch_archive(&env.id, output_path).await? {
            None => Ok(missing_output_message(output_path)),
            Some(archive) => unpack_output(&archive, output_path),
        }
    }

    /// 惰性建立通道：活连接直接复用，否则发现端口、定位凭据、按策略重试连接
    async fn ensure_connected(&self, env: &mut EphemeralEnvironment) -> Result<(), SandboxError> {
        if let Some(channel) = &env.channel {
            if channel.is_alive().await {
                return Ok(());
            }
        }

        let endpoint = self.platform.control_endpoint(&env.id).await?;
        self.connector.locate_credential()?;

        let connector = &self.connector;
        let container = short_id(&env.id);
        let channel = self
            .retry
            .run("Sandbox channel connect", |attempt| {
                let endpoint = &endpoint;
                async move {
                    tracing::debug!(
                        container = %container,
                        attempt,
                        "Connecting to {}:{}",
                        endpoint.host,
                        endpoint.port
                    );
                    connector.connect(endpoint).await
                }
            })
            .await?;

        tracing::info!(container = %container, "Sandbox channel established");
        env.channel = Some(channel);
        Ok(())
    }

    /// 关闭通道并销毁实例；错误只记录，不覆盖执行结果
    async fn teardown(&self, env: &mut EphemeralEnvironment) {
        if let Some(mut channel) = env.channel.take() {
            if let Err(e) = channel.close().await {
                tracing::warn!(container = %short_id(&env.id), "Failed to close channel: {}", e);
            }
        }
        match self.platform.destroy(&env.id).await {
            Ok(()) => tracing::info!(container = %short_id(&env.id), "Sandbox destroyed"),
            Err(e) => {
                tracing::error!(container = %short_id(&env.id), "Failed to destroy sandbox: {}", e)
            }
        }
    }
}

#[async_trait]
impl CommandExecutor for EphemeralEnvironmentManager {
    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutput, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let start = Instant::now();
        let filename = output_filename(command);
        let output_path = self.output_path(&filename);

        let id = self.platform.provision().await?;
        tracing::info!(container = %short_id(&id), "Sandbox provisioned");
        let mut env = EphemeralEnvironment { id, channel: None };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SandboxError::Cancelled),
            r = self.drive(&mut env, command, &output_path) => r,
        };

        self.teardown(&mut env).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(SandboxError::Cancelled) => "cancelled",
            Err(SandboxError::CommandTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "sandbox_audit",
            "container": short_id(&env.id),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "command_preview": command.chars().take(AUDIT_PREVIEW_CHARS).collect::<String>(),
        });
        tracing::info!(audit = %audit.to_string(), "sandbox");

        result.map(|file_content| ExecutionOutput {
            filename,
            file_content,
        })
    }
}

/// 由命令派生输出文件名：只保留字母数字、空格、`_`、`-`，去尾部空白，空格换成 `_`，加 6 位随机十六进制后缀
pub fn output_filename(command: &str) -> String {
    let kept: String = command
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .take(MAX_STEM_CHARS)
        .collect();
    let stem = kept.trim_end().replace(' ', "_");
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("{stem}_{suffix}.txt")
}
