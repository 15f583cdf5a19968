//! 决策端（Decision Oracle）：生成计划、选择下一步动作、评估任务完成情况

pub mod llm;
pub mod parse;

use std::collections::HashSet;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::mission::{History, HistoryEntry, Plan};
use crate::tools::FINISH_MISSION;

pub use llm::LlmOracle;

/// 下一步动作：能力名 + 输入文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NextAction {
    /// 能力名，或 finish_mission
    pub tool_name: String,
    /// 能力输入；finish_mission 时为最终总结
    pub tool_input: String,
}

impl NextAction {
    pub fn new(tool_name: impl Into<String>, tool_input: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input: tool_input.into(),
        }
    }

    pub fn finish(summary: impl Into<String>) -> Self {
        Self::new(FINISH_MISSION, summary)
    }

    pub fn is_finish(&self) -> bool {
        self.tool_name == FINISH_MISSION
    }
}

/// 评估回复：本次新完成的任务 id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanUpdate {
    pub completed_task_ids: Vec<u32>,
}

/// 决策端抽象；所有调用都可失败，降级规则由状态机负责
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// 目标 → 有序任务描述；空列表即规划失败
    async fn create_plan(&self, goal: &str) -> Result<Vec<String>, AgentError>;

    /// 选择下一步动作；force_finish 为真时要求直接给出 finish_mission 总结
    async fn choose_next_action(
        &self,
        goal: &str,
        plan: &Plan,
        history: &History,
        force_finish: bool,
    ) -> Result<NextAction, AgentError>;

    /// 根据最近一次观察判断哪些任务已完成
    async fn assess_completed_tasks(
        &self,
        goal: &str,
        plan: &Plan,
        last: Option<&HistoryEntry>,
    ) -> Result<HashSet<u32>, AgentError>;
}
