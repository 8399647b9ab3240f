//! StepExecutor：逐步执行计划，每步一个有上限的工具调用循环
//!
//! 执行 LLM 要么输出单个 JSON 工具调用 {"tool": ..., "args": {...}}，
//! 要么输出纯文本步骤结果；以 "FINAL ANSWER:" 开头的结果提前终止整个
//! 计划。可恢复的工具失败作为 Observation 反馈给 LLM 继续；不可恢复的
//! 能力错误（浏览器超时 / 断连等）直接上抛，由重试层决定是否重跑。

use std::fmt::Write as _;

use serde_json::Value;

use crate::core::{AgentError, TaskChannel};
use crate::llm::{LlmClient, Message};
use crate::plan::Plan;
use crate::tools::ToolExecutor;

/// 最终答案哨兵；出现在步骤结果开头时跳过剩余步骤
const FINAL_ANSWER_PREFIX: &str = "FINAL ANSWER:";

/// 事件与反馈里的文本预览上限
const PREVIEW_CHARS: usize = 200;

/// 执行 LLM 的一次输出：工具调用或纯文本结果
#[derive(Debug, Clone, PartialEq)]
pub enum LlmAction {
    ToolCall { tool: String, args: Value },
    Answer(String),
}

/// 解析执行 LLM 的输出
///
/// 优先找 ```json 围栏，其次找裸 JSON 对象；都没有则视为纯文本答案。
/// 看起来像 JSON 却解析失败时返回错误，由调用方反馈给 LLM 重试。
pub fn parse_llm_action(raw: &str) -> Result<LlmAction, AgentError> {
    let trimmed = raw.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let end = rest.find("```").unwrap_or(rest.len());
        Some(rest[..end].trim())
    } else if trimmed.starts_with('{') {
        Some(trimmed)
    } else {
        None
    };

    let Some(json_str) = json_str else {
        return Ok(LlmAction::Answer(trimmed.to_string()));
    };

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AgentError::Execution(format!("invalid tool call JSON: {}", e)))?;
    let tool = value
        .get("tool")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::Execution("tool call JSON missing 'tool' field".to_string()))?
        .to_string();
    let args = value.get("args").cloned().unwrap_or_else(|| Value::Object(Default::default()));

    Ok(LlmAction::ToolCall { tool, args })
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        flat.chars().take(PREVIEW_CHARS).collect::<String>() + "..."
    } else {
        flat
    }
}

/// 单步执行结果
struct StepOutcome {
    text: String,
    /// Some 表示步骤给出了整个任务的最终答案
    final_answer: Option<String>,
}

/// StepExecutor：执行 LLM + 工具执行器 + 每步调用预算
pub struct StepExecutor {
    llm: std::sync::Arc<dyn LlmClient>,
    tools: ToolExecutor,
    max_tool_calls_per_step: usize,
}

impl StepExecutor {
    pub fn new(
        llm: std::sync::Arc<dyn LlmClient>,
        tools: ToolExecutor,
        max_tool_calls_per_step: usize,
    ) -> Self {
        Self {
            llm,
            tools,
            max_tool_calls_per_step: max_tool_calls_per_step.max(1),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the execution engine of a plan-and-execute agent. You are given the \
original task, the full plan, the results of previous steps, and the current step. Work on \
the current step only.\n\nAvailable tools:\n{}\n\nTo call a tool, respond with exactly one \
JSON object of the form {{\"tool\": \"<name>\", \"args\": {{...}}}} and nothing else. When \
the current step is done, respond with plain text describing its result (no JSON). If that \
result fully answers the user's original task, start your plain-text response with \
'FINAL ANSWER:' followed by the answer.",
            self.tools.schema_json()
        )
    }

    fn step_context(
        task: &str,
        plan: &Plan,
        previous: &[(String, String)],
        step: &str,
    ) -> String {
        let mut ctx = String::new();
        let _ = writeln!(ctx, "Task: {}", task);
        let _ = writeln!(ctx, "\nPlan:\n{}", plan.text);
        if previous.is_empty() {
            let _ = writeln!(ctx, "\nPrevious step results: (none)");
        } else {
            let _ = writeln!(ctx, "\nPrevious step results:");
            for (i, (step, result)) in previous.iter().enumerate() {
                let _ = writeln!(ctx, "{}. {}\n   Result: {}", i + 1, step, preview(result));
            }
        }
        let _ = writeln!(ctx, "\nCurrent step: {}", step);
        ctx
    }

    /// 按顺序执行计划步骤，返回最终答案
    pub async fn run(
        &self,
        task: &str,
        plan: &Plan,
        channel: &TaskChannel,
    ) -> Result<String, AgentError> {
        let total = plan.steps.len();
        let mut previous: Vec<(String, String)> = Vec::with_capacity(total);

        for (i, step) in plan.steps.iter().enumerate() {
            channel.log(format!("Executing step {}/{}: {}", i + 1, total, step));
            let outcome = self.execute_step(task, plan, &previous, step, channel).await?;
            if let Some(answer) = outcome.final_answer {
                tracing::info!(step = i + 1, "final answer produced early");
                return Ok(answer);
            }
            previous.push((step.clone(), outcome.text));
        }

        // 没有显式 FINAL ANSWER 时，最后一步的结果就是答案
        previous
            .pop()
            .map(|(_, result)| result)
            .ok_or_else(|| AgentError::Execution("plan produced no result".to_string()))
    }

    async fn execute_step(
        &self,
        task: &str,
        plan: &Plan,
        previous: &[(String, String)],
        step: &str,
        channel: &TaskChannel,
    ) -> Result<StepOutcome, AgentError> {
        let mut messages = vec![
            Message::system(self.system_prompt()),
            Message::user(Self::step_context(task, plan, previous, step)),
        ];

        for _ in 0..self.max_tool_calls_per_step {
            let raw = self
                .llm
                .complete(&messages)
                .await
                .map_err(AgentError::Llm)?;

            match parse_llm_action(&raw) {
                Ok(LlmAction::Answer(text)) => {
                    let final_answer = text
                        .strip_prefix(FINAL_ANSWER_PREFIX)
                        .map(|rest| rest.trim().to_string());
                    return Ok(StepOutcome { text, final_answer });
                }
                Ok(LlmAction::ToolCall { tool, args }) => {
                    channel.log(format!("tool start: {} {}", tool, preview(&args.to_string())));
                    match self.tools.execute(&tool, args).await {
                        Ok(observation) => {
                            channel.log(format!("tool end: {} -> {}", tool, preview(&observation)));
                            messages.push(Message::assistant(raw));
                            messages.push(Message::user(format!("Observation: {}", observation)));
                        }
                        Err(e) if e.is_fatal_capability_error() => {
                            channel.log(format!("tool end: {} failed: {}", tool, e));
                            return Err(e);
                        }
                        Err(e) => {
                            channel.log(format!("tool end: {} failed: {}", tool, e));
                            messages.push(Message::assistant(raw));
                            messages.push(Message::user(format!(
                                "Tool call failed: {}. Adjust your approach and continue.",
                                e
                            )));
                        }
                    }
                }
                Err(e) => {
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(format!(
                        "Your response could not be parsed: {}. Reply with a single JSON tool \
call or a plain-text step result.",
                        e
                    )));
                }
            }
        }

        Err(AgentError::Execution(format!(
            "step exceeded the tool call budget of {}",
            self.max_tool_calls_per_step
        )))
    }
}
