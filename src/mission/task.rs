//! 计划、任务与执行历史
//!
//! Plan 在创建后成员固定，只有状态字段会变，且只朝 COMPLETED 前进；
//! History 只追加，不修改、不删除。

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个战略任务；tool_* 与 raw_result 记录最终完成它的那次动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: u32,
    pub description: String,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub tool_used: Option<String>,
    #[serde(default)]
    pub tool_input: Option<String>,
    #[serde(default)]
    pub raw_result: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl Task {
    fn new(id: u32, description: String) -> Self {
        Self {
            id,
            description,
            status: TaskStatus::Pending,
            tool_used: None,
            tool_input: None,
            raw_result: None,
            summary: None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan has no tasks")]
    Empty,
    #[error("task ids must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousId { expected: u32, found: u32 },
}

/// 完成任务时记录的证据
#[derive(Debug, Clone, Copy)]
pub struct CompletionEvidence<'a> {
    pub tool_used: &'a str,
    pub tool_input: &'a str,
    pub raw_result: &'a str,
}

/// 有序任务列表；反序列化时校验 id 唯一且从 1 连续
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Task>", into = "Vec<Task>")]
pub struct Plan {
    tasks: Vec<Task>,
}

impl Plan {
    /// 按顺序分配 id 1..=n
    pub fn from_descriptions<I, S>(descriptions: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks: Vec<Task> = descriptions
            .into_iter()
            .enumerate()
            .map(|(i, d)| Task::new(i as u32 + 1, d.into()))
            .collect();
        Self::try_from(tasks)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    /// 把 ids 中尚未完成的任务标为 COMPLETED 并记录证据；返回本次新完成的 id（按计划顺序）
    ///
    /// 已完成的任务保持原样，未知 id 忽略。
    pub fn mark_completed(&mut self, ids: &HashSet<u32>, evidence: CompletionEvidence<'_>) -> Vec<u32> {
        let mut newly = Vec::new();
        for task in self.tasks.iter_mut() {
            if ids.contains(&task.id) && task.status != TaskStatus::Completed {
                task.status = TaskStatus::Completed;
                task.tool_used = Some(evidence.tool_used.to_string());
                task.tool_input = Some(evidence.tool_input.to_string());
                task.raw_result = Some(evidence.raw_result.to_string());
                newly.push(task.id);
            }
        }
        newly
    }

    /// prompt 中的计划渲染：`  - Task <id> [<STATUS>]: <description>`
    pub fn render(&self) -> String {
        if self.tasks.is_empty() {
            return "No plan provided.".to_string();
        }
        self.tasks
            .iter()
            .map(|t| format!("  - Task {} [{}]: {}", t.id, t.status, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TryFrom<Vec<Task>> for Plan {
    type Error = PlanError;

    fn try_from(tasks: Vec<Task>) -> Result<Self, Self::Error> {
        if tasks.is_empty() {
            return Err(PlanError::Empty);
        }
        for (i, task) in tasks.iter().enumerate() {
            let expected = i as u32 + 1;
            if task.id != expected {
                return Err(PlanError::NonContiguousId {
                    expected,
                    found: task.id,
                });
            }
        }
        Ok(Self { tasks })
    }
}

impl From<Plan> for Vec<Task> {
    fn from(plan: Plan) -> Self {
        plan.tasks
    }
}

/// 一次动作及其观察结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub observation: String,
}

impl HistoryEntry {
    pub fn new(command: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            observation: observation.into(),
        }
    }
}

/// 只追加的执行历史
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// prompt 用的缩进 JSON
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}
