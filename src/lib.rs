//! Sortie - 计划驱动的自主任务智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、外部中断
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **mission**: 计划、历史、快照、报告与任务状态机
//! - **observability**: 日志初始化
//! - **oracle**: 决策端（计划、下一步动作、完成评估）
//! - **sandbox**: 一次性沙箱执行（Docker + SSH，或远端沙箱服务）
//! - **tools**: 能力注册表与内置能力目录

pub mod config;
pub mod core;
pub mod llm;
pub mod mission;
pub mod observability;
pub mod oracle;
pub mod sandbox;
pub mod tools;
