//! 基于 LLM 的决策端
//!
//! 计划：编号文本列表；动作与评估：JSON 对象（允许被 Markdown 包裹）。
//! 每次调用受 request timeout 约束，超时映射为 OracleTimeout。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::schema_for;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::mission::{History, HistoryEntry, Plan};
use crate::oracle::parse::{parse_json_reply, parse_numbered_plan};
use crate::oracle::{DecisionOracle, NextAction, PlanUpdate};

const PLANNER_PROMPT: &str = r#"You are an EXPERT PENTESTING strategist. Your job is to convert a user's goal into a simple, NUMBERED list of high-level steps.

**Crucial Rules for Planning:**
1.  Your output MUST be a NUMBERED list, starting with "1.".
2.  Each item on the list should be a single, clear strategic step.
3.  Do not include specific commands, only the description of the step.
4.  Do not add any preamble, conversational text, or closing remarks.

**Example of a PERFECT response:**
User Goal: "Find the web server on example.com and see its homepage."
Your Response:
1. Scan example.com for open web ports to identify the web server.
2. If a web server is found, retrieve the content of its homepage.
"#;

const ASSESSOR_SYSTEM_PROMPT: &str = "You are a JSON-only plan updating assistant.";

pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    action_system_prompt: String,
    timeout: Duration,
    action_temperature: f32,
}

impl LlmOracle {
    /// manifest 为能力清单（CapabilityRegistry::manifest）
    pub fn new(llm: Arc<dyn LlmClient>, manifest: &str, timeout: Duration) -> Self {
        Self {
            llm,
            action_system_prompt: action_system_prompt(manifest),
            timeout,
            action_temperature: 0.2,
        }
    }

    pub fn with_action_temperature(mut self, temperature: f32) -> Self {
        self.action_temperature = temperature;
        self
    }

    async fn ask(&self, messages: Vec<Message>, temperature: Option<f32>) -> Result<String, AgentError> {
        let call = async {
            match temperature {
                Some(t) => self.llm.complete_with_temperature(&messages, t).await,
                None => self.llm.complete(&messages).await,
            }
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(AgentError::LlmError(e)),
            Err(_) => Err(AgentError::OracleTimeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn create_plan(&self, goal: &str) -> Result<Vec<String>, AgentError> {
        tracing::info!("Generating strategic plan for goal: '{}'", goal);
        let reply = self
            .ask(
                vec![
                    Message::system(PLANNER_PROMPT),
                    Message::user(format!("Goal: {goal}")),
                ],
                None,
            )
            .await?;

        let steps = parse_numbered_plan(reply.trim());
        if steps.is_empty() {
            return Err(AgentError::PlanningFailed(format!(
                "the model failed to generate a valid, numbered plan. Raw response: \"{}\"",
                reply.trim()
            )));
        }
        Ok(steps)
    }

    async fn choose_next_action(
        &self,
        goal: &str,
        plan: &Plan,
        history: &History,
        force_finish: bool,
    ) -> Result<NextAction, AgentError> {
        let user_prompt = if force_finish {
            forced_finish_prompt(goal, history)
        } else {
            next_action_prompt(goal, plan, history)
        };
        let reply = self
            .ask(
                vec![
                    Message::system(self.action_system_prompt.clone()),
                    Message::user(user_prompt),
                ],
                Some(self.action_temperature),
            )
            .await?;

        let action: NextAction = parse_json_reply(&reply)?;
        if force_finish {
            tracing::info!("AI is summarizing the mission to finish.");
        } else {
            tracing::info!(
                "AI's next action: tool '{}' with input '{}'",
                action.tool_name,
                action.tool_input
            );
        }
        Ok(action)
    }

    async fn assess_completed_tasks(
        &self,
        _goal: &str,
        plan: &Plan,
        last: Option<&HistoryEntry>,
    ) -> Result<HashSet<u32>, AgentError> {
        let reply = self
            .ask(
                vec![
                    Message::system(ASSESSOR_SYSTEM_PROMPT),
                    Message::user(assessment_prompt(plan, last)),
                ],
                Some(0.0),
            )
            .await?;

        let update: PlanUpdate = parse_json_reply(&reply)?;
        Ok(update.completed_task_ids.into_iter().collect())
    }
}

fn action_system_prompt(manifest: &str) -> String {
    let schema = serde_json::to_string_pretty(&schema_for!(NextAction)).unwrap_or_default();
    format!(
        r#"You are an expert penetration tester and command-line AI. Your SOLE function is to output a single, valid JSON object that represents the next best command to execute.

I. RESPONSE FORMATTING RULES (MANDATORY)
1.  **JSON ONLY:** Your entire response MUST be a single JSON object. Do not add explanations or any other text.
2.  **CORRECT SCHEMA:** The JSON object MUST have exactly two keys: `"tool_name"` and `"tool_input"`.
3.  **STRING INPUT:** The value for `"tool_input"` MUST be a single string.

II. STRATEGIC ANALYSIS & COMMAND RULES (HOW TO THINK)
1.  **FOCUS ON PENDING TASKS:** Look at the strategic plan and focus only on tasks with a 'PENDING' status.
2.  **DO NOT REPEAT YOURSELF:** If you have already used a tool and it did not complete the task, DO NOT use that same tool with the same input again. Choose a different tool to make progress.
3.  **Learn from Failures:** If a tool fails or provides no useful information for the current task, choose a different tool.
4.  **Goal Completion:** Once all tasks in the plan are 'COMPLETED', you MUST use the `finish_mission` tool.

III. AVAILABLE TOOLS:
{manifest}

IV. RESPONSE JSON SCHEMA:
{schema}
"#
    )
}

fn next_action_prompt(goal: &str, plan: &Plan, history: &History) -> String {
    format!(
        "Based on the goal, plan, and history below, decide the single best tool to use next to progress on a PENDING task. Respond with a single, valid JSON object.\n\n\
         **Main Goal:** {goal}\n\n\
         **Strategic Plan:**\n{}\n\n\
         **Execution History (most recent last):**\n{}",
        plan.render(),
        history.to_prompt_json()
    )
}

fn forced_finish_prompt(goal: &str, history: &History) -> String {
    format!(
        "CRITICAL: All tasks in the strategic plan are now marked as 'COMPLETED'.\n\
         You MUST now use the `finish_mission` tool.\n\
         Review the full execution history and provide a detailed, final summary of your findings as the `tool_input`.\n\
         Your response MUST be the required JSON object.\n\n\
         **Main Goal:** {goal}\n\n\
         **Execution History:**\n{}",
        history.to_prompt_json()
    )
}

fn assessment_prompt(plan: &Plan, last: Option<&HistoryEntry>) -> String {
    let last = last
        .and_then(|e| serde_json::to_string_pretty(e).ok())
        .unwrap_or_else(|| "No actions yet.".to_string());
    format!(
        "You are an expert project manager AI. Your job is to determine which tasks are now complete. \
         Review the strategic plan and the observation from the MOST RECENT command.\n\n\
         **CRITICAL INSTRUCTION:** The output from one command (like a port scan) might contain all the information needed to complete subsequent 'analysis' tasks. \
         For example, if Task 1 is 'Scan the target' and Task 2 is 'Identify the web server', the output of the `nmap` scan for Task 1 likely contains the web server name, completing Task 2 at the same time.\n\n\
         **BE STRICT:** Only mark a task as complete if the observation explicitly and fully provides the information required by the task description. \
         If a task requires an Nmap scan, the observation MUST contain Nmap results.\n\n\
         Identify ALL task IDs that are now fully completed by the last action's observation. \
         Your response MUST be a single JSON object with one key: `\"completed_task_ids\"`, which is a list of integers. \
         Example: `{{\"completed_task_ids\": [1, 2]}}`. If no tasks were completed, return an empty list.\n\n\
         **Strategic Plan:**\n{}\n\n\
         **Most Recent Action & Observation:**\n{last}",
        plan.render()
    )
}
