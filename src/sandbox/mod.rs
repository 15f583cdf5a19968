//! 沙箱：每条命令一个一次性隔离实例
//!
//! - **platform** / **docker**: 实例的创建与销毁（Docker 实现）
//! - **channel**: 远程命令通道（SSH 实现）
//! - **manager**: 一次性环境管理器，串起完整的单次执行协议
//! - **remote**: 通过 HTTP 调用独立部署的沙箱服务
//! - **server**: 沙箱 HTTP 服务（feature `server`）

pub mod archive;
pub mod channel;
pub mod docker;
pub mod error;
pub mod manager;
pub mod platform;
pub mod remote;
pub mod retry;
#[cfg(feature = "server")]
pub mod server;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use channel::{ChannelConnector, ChannelEndpoint, SandboxChannel, SshChannel, SshConnector};
pub use docker::DockerPlatform;
pub use error::SandboxError;
pub use manager::{output_filename, EphemeralEnvironmentManager};
pub use platform::SandboxPlatform;
pub use remote::RemoteSandbox;
pub use retry::RetryPolicy;

/// 执行请求（HTTP 边界）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
}

/// 一次执行的产物：输出文件名与其文本内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub filename: String,
    pub file_content: String,
}

/// 命令执行器：进程内 EEM 与远端沙箱服务共用的接口
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// 执行一条已构造好的命令；取消时返回 SandboxError::Cancelled
    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutput, SandboxError>;
}

/// 日志里展示的 12 位短 ID
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_execution_output_wire_format() {
        let out = ExecutionOutput {
            filename: "dig_short_abc123.txt".into(),
            file_content: "1.2.3.4\n".into(),
        };
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["filename"], "dig_short_abc123.txt");
        assert_eq!(v["file_content"], "1.2.3.4\n");
    }
}
