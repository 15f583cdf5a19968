//! 能力注册表
//!
//! 能力即数据：名称 + 描述（供 LLM 理解）+ 纯函数的命令构造器。
//! CapabilityRegistry 按名注册与查找，注册时拒绝重名。

use std::collections::HashMap;

use thiserror::Error;

/// 保留的结束能力名：不在注册表中，由状态机直接处理
pub const FINISH_MISSION: &str = "finish_mission";

const FINISH_MISSION_DESCRIPTION: &str = "Use this tool when all tasks are complete. The tool_input should be a final, detailed summary of all findings.";

/// 单个能力：构造器只拼接命令字符串，不做输入校验
#[derive(Clone, Copy)]
pub struct Capability {
    pub name: &'static str,
    pub description: &'static str,
    pub construct: fn(&str) -> String,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability").field("name", &self.name).finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered.")]
    Duplicate(String),
}

/// 能力注册表：按名称存储 Capability，支持 register / get / construct / manifest
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<&'static str, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Capability) -> Result<(), RegistryError> {
        if capability.name == FINISH_MISSION || self.capabilities.contains_key(capability.name) {
            return Err(RegistryError::Duplicate(capability.name.to_string()));
        }
        tracing::debug!("Registered tool: '{}'", capability.name);
        self.capabilities.insert(capability.name, capability);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// 按名构造命令；未知名称返回 None
    pub fn construct(&self, name: &str, input: &str) -> Option<String> {
        self.get(name).map(|c| (c.construct)(input))
    }

    /// 已注册能力名（按名称排序）
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.capabilities.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// 生成 prompt 中的能力清单：按名称排序，末尾附加 finish_mission
    pub fn manifest(&self) -> String {
        let mut lines: Vec<String> = self
            .names()
            .into_iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| format!("- `{}`: {}", c.name, c.description))
            .collect();
        lines.push(format!("- `{}`: {}", FINISH_MISSION, FINISH_MISSION_DESCRIPTION));
        lines.join("\n")
    }
}
