//! 任务状态机（MSM）
//!
//! PLANNING → EXECUTION LOOP → TERMINATION。
//! 单步失败（未知能力、命令执行失败、决策端格式错误）都变成 Observation 继续循环；
//! 只有规划失败、连接失败与外部中断会提前结束。进入执行循环后的每条退出路径都会写报告并删除快照。

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::mission::report::write_report;
use crate::mission::state::{LoadOutcome, MissionState, SessionStore};
use crate::mission::{CompletionEvidence, History, HistoryEntry, Operator, Plan, TaskStatus};
use crate::oracle::{DecisionOracle, NextAction};
use crate::sandbox::{CommandExecutor, ExecutionOutput, SandboxError};
use crate::tools::{CapabilityRegistry, FINISH_MISSION};

const DEFAULT_MAX_STEPS: usize = 20;

/// 任务如何结束
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionOutcome {
    /// 决策端发出 finish_mission
    Completed,
    /// 达到步数上限
    StepLimitReached,
    /// 外部中断（Ctrl+C / SIGTERM）
    Interrupted,
    /// 连接失败等不可恢复错误
    Aborted(String),
    /// 没有可用计划
    PlanningFailed(String),
    /// 操作员拒绝计划
    PlanDeclined,
}

impl fmt::Display for MissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionOutcome::Completed => write!(f, "completed"),
            MissionOutcome::StepLimitReached => write!(f, "step limit reached"),
            MissionOutcome::Interrupted => write!(f, "interrupted"),
            MissionOutcome::Aborted(reason) => write!(f, "aborted: {reason}"),
            MissionOutcome::PlanningFailed(reason) => write!(f, "planning failed: {reason}"),
            MissionOutcome::PlanDeclined => write!(f, "plan declined by operator"),
        }
    }
}

/// 一次 run() 的结果
#[derive(Debug, Clone)]
pub struct MissionReport {
    pub outcome: MissionOutcome,
    /// 写出的报告路径；历史为空或未进入执行循环时为 None
    pub report_path: Option<PathBuf>,
    /// 本次运行执行的循环轮数
    pub steps: usize,
    /// 结束时的计划（规划失败时为 None）
    pub plan: Option<Plan>,
    pub history: History,
}

impl MissionReport {
    fn early(outcome: MissionOutcome) -> Self {
        Self {
            outcome,
            report_path: None,
            steps: 0,
            plan: None,
            history: History::new(),
        }
    }
}

/// 致命错误对应的结束原因：取消视为中断，其余视为中止
fn fatal_outcome(err: AgentError) -> MissionOutcome {
    match err {
        AgentError::Cancelled | AgentError::Execution(SandboxError::Cancelled) => {
            MissionOutcome::Interrupted
        }
        other => {
            tracing::error!("Fatal error, aborting run: {}", other);
            MissionOutcome::Aborted(other.to_string())
        }
    }
}

pub struct MissionStateMachine {
    goal: String,
    oracle: Arc<dyn DecisionOracle>,
    registry: CapabilityRegistry,
    executor: Arc<dyn CommandExecutor>,
    operator: Arc<dyn Operator>,
    results_root: PathBuf,
    store: SessionStore,
    max_steps: usize,
    cancel: CancellationToken,
}

impl MissionStateMachine {
    pub fn new(
        goal: impl Into<String>,
        oracle: Arc<dyn DecisionOracle>,
        registry: CapabilityRegistry,
        executor: Arc<dyn CommandExecutor>,
        operator: Arc<dyn Operator>,
        results_root: impl Into<PathBuf>,
    ) -> Self {
        let results_root = results_root.into();
        Self {
            goal: goal.into(),
            oracle,
            registry,
            executor,
            operator,
            store: SessionStore::new(&results_root),
            results_root,
            max_steps: DEFAULT_MAX_STEPS,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// 存在旧快照时询问是否恢复；拒绝则删除
    pub async fn initialize_mission(&self) -> Result<(), AgentError> {
        std::fs::create_dir_all(&self.results_root)?;
        if self.store.exists() {
            let resume = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                r = self
                    .operator
                    .confirm("An existing session file was found. Do you want to resume?") => r,
            };
            if !resume {
                self.store.delete()?;
                tracing::info!("Previous session file deleted. Starting a fresh mission.");
            }
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<MissionReport, AgentError> {
        let mut state = match self.load_snapshot()? {
            Some(state) => state,
            None => match self.plan_mission().await? {
                Ok(state) => state,
                Err(outcome) => {
                    tracing::error!("Mission aborted before execution: {}", outcome);
                    return Ok(MissionReport::early(outcome));
                }
            },
        };

        let (outcome, steps) = self.execution_loop(&mut state).await;
        Ok(self.terminate(state, outcome, steps))
    }

    /// 读取可恢复的快照；目标不一致或快照损坏时从头开始
    fn load_snapshot(&self) -> Result<Option<MissionState>, AgentError> {
        match self.store.load(&self.goal)? {
            LoadOutcome::Missing => Ok(None),
            LoadOutcome::GoalMismatch => {
                tracing::warn!("Session file goal does not match. Starting fresh.");
                Ok(None)
            }
            LoadOutcome::Corrupt(e) => {
                tracing::error!("Failed to load session file ({}). Starting fresh.", e);
                self.store.delete()?;
                Ok(None)
            }
            LoadOutcome::Resumed(state) => {
                tracing::info!(
                    steps = state.mission_history.len(),
                    "Successfully loaded and resumed mission."
                );
                Ok(Some(state))
            }
        }
    }

    /// PLANNING：生成计划并请操作员确认；确认后落盘
    async fn plan_mission(&self) -> Result<Result<MissionState, MissionOutcome>, AgentError> {
        tracing::info!("Starting new mission for goal: {}", self.goal);

        let steps = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Err(MissionOutcome::Interrupted)),
            r = self.oracle.create_plan(&self.goal) => r,
        };
        let steps = match steps {
            Ok(steps) => steps,
            Err(e) => return Ok(Err(MissionOutcome::PlanningFailed(e.to_string()))),
        };
        let plan = match Plan::from_descriptions(steps) {
            Ok(plan) => plan,
            Err(e) => return Ok(Err(MissionOutcome::PlanningFailed(e.to_string()))),
        };

        tracing::info!("High-Level Plan Created:");
        for task in plan.tasks() {
            tracing::info!("  {}. {}", task.id, task.description);
        }

        let proceed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Err(MissionOutcome::Interrupted)),
            r = self.operator.confirm("Proceed with this plan?") => r,
        };
        if !proceed {
            tracing::info!("Mission aborted by user.");
            return Ok(Err(MissionOutcome::PlanDeclined));
        }

        let state = MissionState {
            goal: self.goal.clone(),
            plan,
            mission_history: History::new(),
        };
        self.store.save(&state)?;
        Ok(Ok(state))
    }

    /// EXECUTION LOOP：返回结束原因与本次运行的轮数
    ///
    /// 步数上限按整个任务的历史长度计算，恢复的任务不会得到新的额度。
    async fn execution_loop(&self, state: &mut MissionState) -> (MissionOutcome, usize) {
        let mut steps = 0;
        loop {
            if state.mission_history.len() >= self.max_steps {
                tracing::warn!("Max step limit ({}) reached.", self.max_steps);
                return (MissionOutcome::StepLimitReached, steps);
            }
            if self.cancel.is_cancelled() {
                return (MissionOutcome::Interrupted, steps);
            }
            steps += 1;

            let action = match self.next_action(state).await {
                Some(action) => action,
                None => return (MissionOutcome::Interrupted, steps),
            };

            if action.is_finish() {
                tracing::info!("AI has decided the mission is complete.");
                state
                    .mission_history
                    .push(HistoryEntry::new(FINISH_MISSION, action.tool_input));
                return (MissionOutcome::Completed, steps);
            }

            let observation = match self.registry.construct(&action.tool_name, &action.tool_input) {
                None => {
                    tracing::error!("AI selected a non-existent tool: '{}'", action.tool_name);
                    format!(
                        "Error: {}",
                        AgentError::CapabilityNotFound(action.tool_name.clone())
                    )
                }
                Some(command) => match self.executor.execute(&command, &self.cancel).await {
                    Ok(output) => {
                        self.persist_artifact(&output);
                        output.file_content
                    }
                    Err(e) => {
                        let err = AgentError::from(e);
                        if err.is_fatal() {
                            return (fatal_outcome(err), steps);
                        }
                        tracing::error!(
                            "An error occurred during tool execution for '{}': {}",
                            action.tool_name,
                            err
                        );
                        format!("Tool '{}' failed with error: {}", action.tool_name, err)
                    }
                },
            };

            state.mission_history.push(HistoryEntry::new(
                format!("[{}] {}", action.tool_name, action.tool_input),
                observation.clone(),
            ));

            let interrupted = self.update_plan_status(state, &action, &observation).await;
            self.save_snapshot(state);
            if interrupted {
                return (MissionOutcome::Interrupted, steps);
            }
        }
    }

    /// 请求下一步动作，应用降级与强制结束规则；被中断时返回 None
    async fn next_action(&self, state: &MissionState) -> Option<NextAction> {
        tracing::info!("Thinking about the next step...");
        self.log_plan_status(&state.plan);

        let force_finish = state.plan.all_completed();
        if force_finish {
            tracing::info!("All plan tasks are complete. Forcing finish_mission.");
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = self.oracle.choose_next_action(
                &self.goal,
                &state.plan,
                &state.mission_history,
                force_finish,
            ) => r,
        };

        let action = match result {
            Ok(action) => action,
            Err(e) => {
                tracing::error!("Critical error during thought process: {}", e);
                NextAction::finish(format!("Mission failed: {e}"))
            }
        };

        if force_finish && !action.is_finish() {
            tracing::warn!(
                "Oracle chose '{}' although every task is completed; overriding with finish_mission.",
                action.tool_name
            );
            return Some(NextAction::finish(format!(
                "Mission failed: all tasks were completed but the decision oracle chose '{}' instead of finish_mission.",
                action.tool_name
            )));
        }
        Some(action)
    }

    /// 评估最近一次观察完成了哪些任务；返回是否在评估中被中断
    async fn update_plan_status(
        &self,
        state: &mut MissionState,
        action: &NextAction,
        observation: &str,
    ) -> bool {
        tracing::info!("Assessing plan progress based on recent actions...");
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return true,
            r = self.oracle.assess_completed_tasks(
                &self.goal,
                &state.plan,
                state.mission_history.last(),
            ) => r,
        };

        let ids = match result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to identify completed tasks: {}", e);
                HashSet::new()
            }
        };
        if ids.is_empty() {
            tracing::info!("  - No new tasks were marked as completed.");
            return false;
        }

        let evidence = CompletionEvidence {
            tool_used: &action.tool_name,
            tool_input: &action.tool_input,
            raw_result: observation,
        };
        for id in state.plan.mark_completed(&ids, evidence) {
            tracing::info!("  - Status Updated: Task {} is now COMPLETED.", id);
        }
        false
    }

    fn log_plan_status(&self, plan: &Plan) {
        tracing::info!("--- Current Mission Status ---");
        for task in plan.tasks() {
            let marker = match task.status {
                TaskStatus::Completed => "[x]",
                TaskStatus::Failed => "[!]",
                TaskStatus::Pending | TaskStatus::Running => "[ ]",
            };
            tracing::info!("  {} Task {} [{}]: {}", marker, task.id, task.status, task.description);
        }
        tracing::info!("------------------------------");
    }

    /// 把命令输出写到 `<results_root>/<filename>`；失败只记录
    fn persist_artifact(&self, output: &ExecutionOutput) {
        let Some(name) = Path::new(&output.filename).file_name() else {
            tracing::warn!("Ignoring output with invalid filename '{}'", output.filename);
            return;
        };
        let path = self.results_root.join(name);
        match std::fs::write(&path, &output.file_content) {
            Ok(()) => tracing::info!("Observation saved to '{}'", path.display()),
            Err(e) => tracing::error!("Failed to save observation to '{}': {}", path.display(), e),
        }
    }

    fn save_snapshot(&self, state: &MissionState) {
        if let Err(e) = self.store.save(state) {
            tracing::error!("Failed to save mission state: {}", e);
        }
    }

    /// TERMINATION：写报告、删快照
    fn terminate(&self, state: MissionState, outcome: MissionOutcome, steps: usize) -> MissionReport {
        tracing::info!(outcome = %outcome, steps, "Generating final mission report...");
        let report_path = match write_report(&self.results_root, &self.goal, &state.mission_history) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Failed to write report file: {}", e);
                None
            }
        };

        match self.store.delete() {
            Ok(()) => tracing::info!("Session file cleaned up."),
            Err(e) => tracing::error!("Failed to delete session file: {}", e),
        }

        MissionReport {
            outcome,
            report_path,
            steps,
            plan: Some(state.plan),
            history: state.mission_history,
        }
    }
}
