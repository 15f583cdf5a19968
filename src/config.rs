//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SORTIE__*` 覆盖（双下划线表示嵌套，如 `SORTIE__LLM__MODEL=llama3`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// [app] 段：结果目录与步数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 快照、输出文件、报告与日志的根目录
    #[serde(default = "default_results_root")]
    pub results_root: PathBuf,
    /// 单次运行的最大执行轮数
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            results_root: default_results_root(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_results_root() -> PathBuf {
    PathBuf::from("Projects")
}

fn default_max_steps() -> usize {
    20
}

/// [llm] 段：OpenAI 兼容端点（本地 Ollama 等），base_url 与 model 必填
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// 选择下一步动作时的采样温度
    #[serde(default = "default_temperature_action")]
    pub temperature_action: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            api_key: None,
            temperature_action: default_temperature_action(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_temperature_action() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次决策请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    600
}

/// [sandbox] 段：镜像、SSH 通道、重试与超时
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_image")]
    pub image: String,
    /// 容器启动命令（保持 sshd 前台运行）
    #[serde(default = "default_container_command")]
    pub container_command: Vec<String>,
    /// 容器内控制端口，Docker 端口键格式
    #[serde(default = "default_control_port")]
    pub control_port: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default = "default_ssh_key")]
    pub ssh_key: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_delay_secs")]
    pub connect_delay_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    /// 容器内输出文件目录
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// 设置后改用远端沙箱服务（sortie-sandbox），不在本进程内操作 Docker
    pub remote_url: Option<String>,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            image: default_image(),
            container_command: default_container_command(),
            control_port: default_control_port(),
            ssh_user: default_ssh_user(),
            ssh_key: default_ssh_key(),
            connect_attempts: default_connect_attempts(),
            connect_delay_secs: default_connect_delay_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            exec_timeout_secs: default_exec_timeout_secs(),
            output_dir: default_output_dir(),
            remote_url: None,
        }
    }
}

fn default_image() -> String {
    "sortie-kali-agent".to_string()
}

fn default_container_command() -> Vec<String> {
    vec!["/usr/sbin/sshd".into(), "-D".into()]
}

fn default_control_port() -> String {
    "22/tcp".to_string()
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_key() -> String {
    "~/.ssh/id_ecdsa".to_string()
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_delay_secs() -> u64 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_settle_delay_secs() -> u64 {
    2
}

fn default_exec_timeout_secs() -> u64 {
    1800
}

fn default_output_dir() -> String {
    "/tmp".to_string()
}

/// [server] 段：sortie-sandbox 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:1611".to_string()
}

impl AppConfig {
    /// 必填项检查：缺少 LLM 端点或模型时直接失败
    pub fn validate(&self) -> Result<(), AgentError> {
        let missing: Vec<&str> = [
            ("llm.base_url", self.llm.base_url.as_deref()),
            ("llm.model", self.llm.model.as_deref()),
        ]
        .into_iter()
        .filter(|(_, v)| v.map(|s| s.trim().is_empty()).unwrap_or(true))
        .map(|(k, _)| k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::ConfigError(format!(
                "missing required configuration: {} (set in config/default.toml or SORTIE__* env)",
                missing.join(", ")
            )))
        }
    }
}

/// 从 config 目录加载配置，环境变量 SORTIE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SORTIE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SORTIE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
