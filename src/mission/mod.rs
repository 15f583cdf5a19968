//! 任务：计划与历史模型、快照持久化、报告、人工确认与状态机

pub mod machine;
pub mod operator;
pub mod report;
pub mod state;
pub mod task;

pub use machine::{MissionOutcome, MissionReport, MissionStateMachine};
pub use operator::{Operator, ScriptedOperator, StdinOperator};
pub use report::write_report;
pub use state::{MissionState, SessionStore};
pub use task::{CompletionEvidence, History, HistoryEntry, Plan, PlanError, Task, TaskStatus};
