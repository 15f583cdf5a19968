//! 容器平台抽象：一次性实例的创建、启动、端口发现、归档读取与销毁

use async_trait::async_trait;

use crate::sandbox::{ChannelEndpoint, SandboxError};

/// 隔离实例的提供方（默认实现为 Docker）
#[async_trait]
pub trait SandboxPlatform: Send + Sync {
    /// 从固定基础镜像创建一个全新实例，返回实例 ID
    async fn provision(&self) -> Result<String, SandboxError>;

    /// 确保实例处于运行状态；未运行则启动并等待短暂的稳定时间
    async fn ensure_running(&self, id: &str) -> Result<(), SandboxError>;

    /// 发现实例控制端口在宿主机上的映射
    async fn control_endpoint(&self, id: &str) -> Result<ChannelEndpoint, SandboxError>;

    /// 以 tar 归档读取实例内的路径；路径不存在时返回 Ok(None)
    async fn fetch_archive(&self, id: &str, path: &str) -> Result<Option<Vec<u8>>, SandboxError>;

    /// 停止并删除实例；实例已不存在视为成功
    async fn destroy(&self, id: &str) -> Result<(), SandboxError>;
}
