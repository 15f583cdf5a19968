//! 任务快照持久化
//!
//! 单文件 JSON：`{goal, plan, mission_history}`。文件存在即表示有可恢复的任务，
//! 正常结束时删除。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::mission::{History, Plan};

pub const SESSION_FILE_NAME: &str = "mission_session.json";

/// 任务快照；以 goal 文本为身份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionState {
    pub goal: String,
    pub plan: Plan,
    #[serde(default)]
    pub mission_history: History,
}

/// 快照读取结果
#[derive(Debug)]
pub enum LoadOutcome {
    /// 没有快照文件
    Missing,
    /// 快照存在但目标不同，已删除
    GoalMismatch,
    /// 快照无法解析（含计划校验失败），保留原文件由调用方决定
    Corrupt(String),
    Resumed(MissionState),
}

/// 快照文件存取：固定路径 `<results_root>/mission_session.json`
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(results_root: impl AsRef<Path>) -> Self {
        Self {
            path: results_root.as_ref().join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 读取快照；目标不一致时删除文件
    pub fn load(&self, goal: &str) -> Result<LoadOutcome, AgentError> {
        if !self.path.exists() {
            return Ok(LoadOutcome::Missing);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let state: MissionState = match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(e) => return Ok(LoadOutcome::Corrupt(e.to_string())),
        };
        if state.goal != goal {
            self.delete()?;
            return Ok(LoadOutcome::GoalMismatch);
        }
        Ok(LoadOutcome::Resumed(state))
    }

    /// 写入快照；父目录不存在时自动创建
    pub fn save(&self, state: &MissionState) -> Result<(), AgentError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        tracing::debug!(path = %self.path.display(), "Mission state saved");
        Ok(())
    }

    /// 删除快照；不存在视为成功
    pub fn delete(&self) -> Result<(), AgentError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
