//! 交互输入工具：任务信息不足时向用户提问
//!
//! 输入途径由注入的 PromptHandler 决定：CLI 读 stdin（可能无限期阻塞，
//! 契约如此）；Web 部署注入 RejectPrompt，直接报能力不可用而不是挂起服务。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

/// 交互输入的注入点
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn request_input(&self, prompt: &str) -> Result<String, AgentError>;
}

/// CLI 场景：打印提示并阻塞读取一行 stdin
pub struct StdinPrompt;

#[async_trait]
impl PromptHandler for StdinPrompt {
    async fn request_input(&self, prompt: &str) -> Result<String, AgentError> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            println!("{}", prompt);
            println!("请输入：");
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("stdin read failed: {}", e)))?;
            Ok(line.trim().to_string())
        })
        .await
        .map_err(|e| AgentError::ToolExecutionFailed(format!("stdin task failed: {}", e)))?
    }
}

/// 无人值守场景：拒绝交互输入
pub struct RejectPrompt;

#[async_trait]
impl PromptHandler for RejectPrompt {
    async fn request_input(&self, _prompt: &str) -> Result<String, AgentError> {
        Err(AgentError::ToolExecutionFailed(
            "interactive input is not available in this deployment".to_string(),
        ))
    }
}

/// ask_user 工具：把 LLM 的提问转交给 PromptHandler
pub struct AskUserTool {
    handler: Arc<dyn PromptHandler>,
}

impl AskUserTool {
    pub fn new(handler: Arc<dyn PromptHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question when the task is ambiguous. Args: {\"prompt\": \"...\"}. Returns the user's answer."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The question shown to the user"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let prompt = args
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if prompt.is_empty() {
            return Err(AgentError::ToolExecutionFailed(
                "Missing prompt".to_string(),
            ));
        }
        self.handler.request_input(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedPrompt;

    #[async_trait]
    impl PromptHandler for CannedPrompt {
        async fn request_input(&self, _prompt: &str) -> Result<String, AgentError> {
            Ok("next Tuesday".to_string())
        }
    }

    #[tokio::test]
    async fn test_ask_user_roundtrip() {
        let tool = AskUserTool::new(Arc::new(CannedPrompt));
        let out = tool
            .execute(serde_json::json!({"prompt": "Which day?"}))
            .await
            .unwrap();
        assert_eq!(out, "next Tuesday");
    }

    #[tokio::test]
    async fn test_reject_prompt() {
        let tool = AskUserTool::new(Arc::new(RejectPrompt));
        let err = tool
            .execute(serde_json::json!({"prompt": "Which day?"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
