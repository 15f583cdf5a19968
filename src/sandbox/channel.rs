//! 沙箱通道：到单个一次性实例的远程命令执行连接
//!
//! ChannelConnector 负责建立连接（由 RetryPolicy 包裹重试），SandboxChannel 持有活连接。
//! 默认实现走 SSH（openssh，复用系统 ssh 的多路复用连接）。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use openssh::{KnownHosts, Session, SessionBuilder};

use crate::sandbox::SandboxError;

/// 实例对外映射的控制端点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub host: String,
    pub port: u16,
}

/// 已建立的远程命令通道
#[async_trait]
pub trait SandboxChannel: Send + Sync {
    /// 连接是否仍可用（可用则复用，不再重连）
    async fn is_alive(&self) -> bool;

    /// 提交命令并阻塞到远端进程退出，返回退出码（被信号终止时为 None）
    async fn run(&self, command: &str) -> Result<Option<i32>, SandboxError>;

    /// 关闭连接；重复调用无副作用
    async fn close(&mut self) -> Result<(), SandboxError>;
}

/// 通道建立器
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// 在重试循环之前定位本地凭据；缺失时直接失败，不进入重试
    fn locate_credential(&self) -> Result<(), SandboxError> {
        Ok(())
    }

    /// 单次连接尝试
    async fn connect(
        &self,
        endpoint: &ChannelEndpoint,
    ) -> Result<Box<dyn SandboxChannel>, SandboxError>;
}

/// SSH 连接器：固定用户 + 固定私钥
pub struct SshConnector {
    user: String,
    key_path: PathBuf,
    connect_timeout: Duration,
}

impl SshConnector {
    /// key 支持 `~` 展开
    pub fn new(user: impl Into<String>, key: &str, connect_timeout: Duration) -> Self {
        Self {
            user: user.into(),
            key_path: PathBuf::from(shellexpand::tilde(key).into_owned()),
            connect_timeout,
        }
    }

    pub fn key_path(&self) -> &std::path::Path {
        &self.key_path
    }
}

#[async_trait]
impl ChannelConnector for SshConnector {
    fn locate_credential(&self) -> Result<(), SandboxError> {
        if self.key_path.is_file() {
            Ok(())
        } else {
            Err(SandboxError::CredentialMissing(
                self.key_path.display().to_string(),
            ))
        }
    }

    async fn connect(
        &self,
        endpoint: &ChannelEndpoint,
    ) -> Result<Box<dyn SandboxChannel>, SandboxError> {
        let mut builder = SessionBuilder::default();
        // 实例用完即毁，宿主机端口每次不同，不写 known_hosts
        builder
            .user(self.user.clone())
            .port(endpoint.port)
            .keyfile(&self.key_path)
            .known_hosts_check(KnownHosts::Accept)
            .user_known_hosts_file("/dev/null")
            .connect_timeout(self.connect_timeout);

        let session = builder
            .connect(&endpoint.host)
            .await
            .map_err(|e| SandboxError::Connection(e.to_string()))?;

        Ok(Box::new(SshChannel {
            session: Some(session),
        }))
    }
}

/// SSH 通道
pub struct SshChannel {
    session: Option<Session>,
}

#[async_trait]
impl SandboxChannel for SshChannel {
    async fn is_alive(&self) -> bool {
        match &self.session {
            Some(session) => session.check().await.is_ok(),
            None => false,
        }
    }

    async fn run(&self, command: &str) -> Result<Option<i32>, SandboxError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| SandboxError::Connection("channel already closed".to_string()))?;
        // raw_command：重定向等 shell 语法交给远端 shell 解释
        let status = session
            .raw_command(command)
            .status()
            .await
            .map_err(|e| SandboxError::Command(e.to_string()))?;
        Ok(status.code())
    }

    async fn close(&mut self) -> Result<(), SandboxError> {
        if let Some(session) = self.session.take() {
            session
                .close()
                .await
                .map_err(|e| SandboxError::Connection(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_reported_before_connecting() {
        let dir = tempfile::TempDir::new().unwrap();
        let key = dir.path().join("id_ecdsa");
        let connector = SshConnector::new("root", key.to_str().unwrap(), Duration::from_secs(1));
        match connector.locate_credential() {
            Err(SandboxError::CredentialMissing(path)) => assert!(path.ends_with("id_ecdsa")),
            other => panic!("expected CredentialMissing, got {other:?}"),
        }

        std::fs::write(&key, "dummy").unwrap();
        assert!(connector.locate_credential().is_ok());
    }

    #[test]
    fn test_tilde_is_expanded() {
        let connector = SshConnector::new("root", "~/.ssh/id_ecdsa", Duration::from_secs(1));
        assert!(!connector.key_path().to_string_lossy().starts_with('~'));
    }
}
