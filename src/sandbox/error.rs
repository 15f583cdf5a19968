//! 沙箱错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    /// 容器平台不可达（启动前置条件，不做重试）
    #[error("Container platform unavailable: {0}")]
    PlatformUnavailable(String),

    #[error("{operation} failed for '{target}': {message}")]
    Platform {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("Failed to find mapped control port {port} for container {container}")]
    ControlPortUnavailable { container: String, port: String },

    #[error("Private key not found at {0}")]
    CredentialMissing(String),

    /// 重试耗尽后的最后一次连接错误
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Remote command failed: {0}")]
    Command(String),

    #[error("Remote command timed out after {0}s")]
    CommandTimeout(u64),

    #[error("Failed to read output archive: {0}")]
    Archive(String),

    /// 远端沙箱服务返回的错误或传输失败
    #[error("{0}")]
    Remote(String),

    #[error("Sandbox execution cancelled")]
    Cancelled,
}

impl SandboxError {
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, SandboxError::Connection(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SandboxError::Cancelled)
    }
}
