//! Agent 错误类型
//!
//! 任务循环对错误的处理分两类：PlanningFailed / Cancelled / 连接失败会结束本次运行；
//! 其余（决策超时、JSON 格式错误、工具执行失败）都会被降级为数据，交给下一轮决策。

use thiserror::Error;

use crate::sandbox::SandboxError;

/// 任务运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 决策端没有给出可用计划
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    #[error("Decision oracle timed out after {0}s")]
    OracleTimeout(u64),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("The tool '{0}' is not valid.")]
    CapabilityNotFound(String),

    #[error(transparent)]
    Execution(#[from] SandboxError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 是否需要立即结束本次运行（其余错误均降级为 Observation 或空结果）
    pub fn is_fatal(&self) -> bool {
        match self {
            AgentError::PlanningFailed(_) | AgentError::Cancelled => true,
            AgentError::Execution(e) => e.is_connection_failure() || e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::JsonParseError(e.to_string())
    }
}
