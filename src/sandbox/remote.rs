//! 远端沙箱：把命令交给独立部署的 sortie-sandbox 服务执行

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::sandbox::{CommandExecutor, ExecuteRequest, ExecutionOutput, SandboxError};

/// HTTP 客户端实现的 CommandExecutor；超时与服务端远程执行超时一致
pub struct RemoteSandbox {
    client: Client,
    execute_url: String,
}

impl RemoteSandbox {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            execute_url: format!("{}/execute", base_url.trim_end_matches('/')),
        }
    }

    pub fn execute_url(&self) -> &str {
        &self.execute_url
    }

    async fn post(&self, command: &str) -> Result<ExecutionOutput, SandboxError> {
        let request = ExecuteRequest {
            command: command.to_string(),
        };
        let resp = self
            .client
            .post(&self.execute_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SandboxError::Remote(format!("Agent-side connection error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Remote(error_detail(status.as_u16(), &body)));
        }

        resp.json::<ExecutionOutput>()
            .await
            .map_err(|e| SandboxError::Remote(format!("Agent-side connection error: {e}")))
    }
}

#[async_trait]
impl CommandExecutor for RemoteSandbox {
    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutput, SandboxError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SandboxError::Cancelled),
            r = self.post(command) => r,
        }
    }
}

/// 服务端错误体 `{detail}` 优先，否则用原始响应体
fn error_detail(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from));
    match detail {
        Some(d) => d,
        None if body.trim().is_empty() => format!("Sandbox service returned HTTP {status}"),
        None => format!("Sandbox service returned HTTP {status}: {}", body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_url_joins_path() {
        let remote = RemoteSandbox::new("http://127.0.0.1:1611/", Duration::from_secs(5));
        assert_eq!(remote.execute_url(), "http://127.0.0.1:1611/execute");
    }

    #[test]
    fn test_error_detail_prefers_server_detail() {
        let body = r#"{"detail":"Command execution failed on server: boom"}"#;
        assert_eq!(
            error_detail(500, body),
            "Command execution failed on server: boom"
        );
        assert_eq!(error_detail(502, ""), "Sandbox service returned HTTP 502");
        assert_eq!(
            error_detail(404, "not here"),
            "Sandbox service returned HTTP 404: not here"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_agent_side_error() {
        // 端口 9 (discard) 通常无人监听
        let remote = RemoteSandbox::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = remote
            .execute("echo hi", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Agent-side connection error"));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let remote = RemoteSandbox::new("http://127.0.0.1:9", Duration::from_secs(2));
        let token = CancellationToken::new();
        token.cancel();
        let err = remote.execute("echo hi", &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
