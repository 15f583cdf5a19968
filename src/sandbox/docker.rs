//! Docker 平台：通过 bollard 调用 Docker Engine API
//!
//! 每个实例：固定镜像 + sshd 前台进程，控制端口发布到 127.0.0.1 的随机端口。
//! 构造时 ping 一次 Docker，不可达直接失败（启动前置条件）。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, DownloadFromContainerOptionsBuilder, InspectContainerOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use bollard::Docker;
use futures_util::TryStreamExt;

use crate::config::SandboxSection;
use crate::sandbox::{short_id, ChannelEndpoint, SandboxError, SandboxPlatform};

const LOOPBACK: &str = "127.0.0.1";
const EPHEMERAL_LABEL: &str = "sortie.ephemeral";

/// Docker 实现的 SandboxPlatform；Docker 句柄可跨任务并发使用
#[derive(Clone)]
pub struct DockerPlatform {
    docker: Docker,
    image: String,
    container_command: Vec<String>,
    control_port: String,
    settle_delay: Duration,
}

impl DockerPlatform {
    /// 连接本地 Docker 并 ping；失败即 PlatformUnavailable
    pub async fn connect(settings: &SandboxSection) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::PlatformUnavailable(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| SandboxError::PlatformUnavailable(format!("{e}. Is Docker running?")))?;
        tracing::info!(image = %settings.image, "Docker platform reachable");

        Ok(Self {
            docker,
            image: settings.image.clone(),
            container_command: settings.container_command.clone(),
            control_port: settings.control_port.clone(),
            settle_delay: Duration::from_secs(settings.settle_delay_secs),
        })
    }

    async fn inspect(&self, id: &str) -> Result<bollard::models::ContainerInspectResponse, BollardError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }
}

#[async_trait]
impl SandboxPlatform for DockerPlatform {
    async fn provision(&self) -> Result<String, SandboxError> {
        let port_bindings = HashMap::from([(
            self.control_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some(LOOPBACK.to_string()),
                host_port: None,
            }]),
        )]);

        let body = ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(self.container_command.clone()),
            exposed_ports: Some(HashMap::from([(self.control_port.clone(), HashMap::new())])),
            labels: Some(HashMap::from([(
                EPHEMERAL_LABEL.to_string(),
                "true".to_string(),
            )])),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions>, body)
            .await
            .map_err(|e| operation_error("create_container", &self.image, e))?;
        Ok(created.id)
    }

    async fn ensure_running(&self, id: &str) -> Result<(), SandboxError> {
        let info = self
            .inspect(id)
            .await
            .map_err(|e| operation_error("inspect_container", id, e))?;
        let running = info.state.and_then(|s| s.running).unwrap_or(false);
        if !running {
            self.docker
                .start_container(id, None::<StartContainerOptions>)
                .await
                .map_err(|e| operation_error("start_container", id, e))?;
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }

    async fn control_endpoint(&self, id: &str) -> Result<ChannelEndpoint, SandboxError> {
        let info = self
            .inspect(id)
            .await
            .map_err(|e| operation_error("inspect_container", id, e))?;

        let binding = info
            .network_settings
            .and_then(|n| n.ports)
            .and_then(|mut ports| ports.remove(&self.control_port))
            .flatten()
            .and_then(|bindings| bindings.into_iter().next());

        let port = binding
            .as_ref()
            .and_then(|b| b.host_port.as_deref())
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| SandboxError::ControlPortUnavailable {
                container: id.to_string(),
                port: self.control_port.clone(),
            })?;

        let host = binding
            .and_then(|b| b.host_ip)
            .filter(|ip| !ip.is_empty() && ip != "0.0.0.0")
            .unwrap_or_else(|| LOOPBACK.to_string());

        Ok(ChannelEndpoint { host, port })
    }

    async fn fetch_archive(&self, id: &str, path: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        let options = DownloadFromContainerOptionsBuilder::new().path(path).build();
        let chunks = self
            .docker
            .download_from_container(id, Some(options))
            .try_collect::<Vec<_>>()
            .await;

        match chunks {
            Ok(chunks) => {
                let mut archive = Vec::new();
                for chunk in chunks {
                    archive.extend_from_slice(&chunk);
                }
                Ok(Some(archive))
            }
            Err(e) if is_not_found_error(&e) => Ok(None),
            Err(e) => Err(operation_error("download_from_container", path, e)),
        }
    }

    async fn destroy(&self, id: &str) -> Result<(), SandboxError> {
        let info = match self.inspect(id).await {
            Ok(info) => info,
            Err(e) if is_not_found_error(&e) => return Ok(()),
            Err(e) => return Err(operation_error("inspect_container", id, e)),
        };

        let status = info.state.and_then(|s| s.status);
        if matches!(
            status,
            Some(ContainerStateStatusEnum::RUNNING) | Some(ContainerStateStatusEnum::CREATED)
        ) {
            match self
                .docker
                .stop_container(id, Some(StopContainerOptionsBuilder::new().t(5).build()))
                .await
            {
                Ok(()) => {}
                Err(e) if is_not_found_error(&e) => return Ok(()),
                Err(e) => tracing::warn!(container = %short_id(id), "stop_container failed: {}", e),
            }
        }

        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptionsBuilder::new().force(true).v(true).build()),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found_error(&e) => Ok(()),
            Err(e) => Err(operation_error("remove_container", id, e)),
        }
    }
}

fn is_not_found_error(error: &BollardError) -> bool {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => *status_code == 404,
        _ => false,
    }
}

fn operation_error(operation: &'static str, target: &str, source: BollardError) -> SandboxError {
    SandboxError::Platform {
        operation,
        target: target.to_string(),
        message: source.to_string(),
    }
}
