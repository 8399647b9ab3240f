//! Planner：把任务描述变成编号步骤计划
//!
//! 规划 LLM 按指令输出「Plan:」标题 + 编号列表，并以 <END_OF_PLAN> 收尾；
//! parse_plan 截掉结束标志并抽取编号行。完整计划文本会作为 plan 事件
//! 发给客户端（先于任何执行），所以原样保留。

use std::sync::Arc;

use regex::Regex;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

/// 计划结束标志
pub const END_OF_PLAN: &str = "<END_OF_PLAN>";

/// 内置规划提示词（config [plan].system_prompt 可覆盖）
pub const DEFAULT_PLANNER_PROMPT: &str = "First understand the task, then devise a plan that \
solves it. Output a heading 'Plan:' followed by a numbered list of concrete steps. Use as few \
steps as possible while still completing the task accurately. If the task is a question, the \
final step is usually 'Given the above steps taken, answer the user's original question'. \
At the very end of the plan, output '<END_OF_PLAN>'.";

/// 解析后的计划：原文（不含结束标志）与步骤列表
#[derive(Debug, Clone)]
pub struct Plan {
    pub text: String,
    pub steps: Vec<String>,
}

/// 从规划 LLM 的输出中抽取编号步骤；一条都抽不出来视为规划失败
pub fn parse_plan(raw: &str) -> Result<Plan, AgentError> {
    let body = match raw.find(END_OF_PLAN) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let body = body.trim();

    // 1. / 1) / 1、 均接受
    let step_re = Regex::new(r"^\s*\d+\s*[.)、]\s*(.+)$").expect("static regex");
    let steps: Vec<String> = body
        .lines()
        .filter_map(|line| {
            step_re
                .captures(line)
                .map(|c| c[1].trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect();

    if steps.is_empty() {
        return Err(AgentError::Planning(format!(
            "planner output contained no numbered steps: {}",
            preview(body)
        )));
    }

    Ok(Plan {
        text: body.to_string(),
        steps,
    })
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        s.chars().take(200).collect::<String>() + "..."
    } else {
        s.to_string()
    }
}

/// Planner：持有规划 LLM 与 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 调用规划 LLM 并解析为 Plan
    pub async fn plan(&self, task: &str) -> Result<Plan, AgentError> {
        let messages = [
            Message::system(self.system_prompt.clone()),
            Message::user(task),
        ];
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::Planning)?;
        parse_plan(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    const SAMPLE_PLAN: &str = "Plan:\n1. Search for the current NVIDIA stock price.\n2. Search for the current AMD stock price.\n3. Compare the two prices and write the result to a file.\n<END_OF_PLAN>";

    #[test]
    fn test_parse_numbered_steps() {
        let plan = parse_plan(SAMPLE_PLAN).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert!(plan.steps[0].starts_with("Search for the current NVIDIA"));
        assert!(!plan.text.contains(END_OF_PLAN));
    }

    #[test]
    fn test_parse_alternate_numbering() {
        let plan = parse_plan("1) first\n2、second\n<END_OF_PLAN>").unwrap();
        assert_eq!(plan.steps, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_missing_marker_still_parses() {
        let plan = parse_plan("1. only step").unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_no_steps_is_planning_error() {
        let err = parse_plan("I cannot plan this.").unwrap_err();
        assert!(matches!(err, AgentError::Planning(_)));
    }

    #[tokio::test]
    async fn test_planner_roundtrip() {
        let planner = Planner::new(
            std::sync::Arc::new(MockLlmClient::new().reply(SAMPLE_PLAN)),
            DEFAULT_PLANNER_PROMPT,
        );
        let plan = planner.plan("compare NVDA and AMD").await.unwrap();
        assert_eq!(plan.steps.len(), 3);
    }
}
