//! 按角色创建 LLM 客户端
//!
//! 路由 / 规划 / 执行 / 直接回答各自有独立的提供方、模型与温度配置；
//! 所有提供方均走 OpenAI 兼容端点（DashScope、Gemini 都提供兼容层）。

use std::sync::Arc;

use crate::config::LlmRoleSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, OpenAiClient};

/// DashScope（通义）OpenAI 兼容端点
const TONGYI_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
/// Gemini OpenAI 兼容端点
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// 根据角色配置创建客户端；API Key 按提供方从对应环境变量读取
pub fn create_llm(role: &LlmRoleSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = role.provider.to_lowercase();

    let (default_base, key_var): (Option<&str>, &str) = match provider.as_str() {
        "openai" => (None, "OPENAI_API_KEY"),
        "tongyi" | "dashscope" => (Some(TONGYI_BASE_URL), "DASHSCOPE_API_KEY"),
        "google" | "gemini" => (Some(GOOGLE_BASE_URL), "GOOGLE_API_KEY"),
        other => {
            return Err(AgentError::Config(format!(
                "Unsupported LLM provider: {}",
                other
            )))
        }
    };

    let base_url = role.base_url.as_deref().or(default_base);
    let api_key = std::env::var(key_var).ok();

    Ok(Arc::new(OpenAiClient::new(
        base_url,
        &role.model,
        api_key.as_deref(),
        role.temperature,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmSection;

    #[test]
    fn test_known_providers() {
        let section = LlmSection::default();
        assert!(create_llm(&section.router).is_ok());
        assert!(create_llm(&section.planner).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let role = LlmRoleSection {
            provider: "carrier-pigeon".to_string(),
            ..LlmRoleSection::default()
        };
        assert!(matches!(create_llm(&role), Err(AgentError::Config(_))));
    }
}
