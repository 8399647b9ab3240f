//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预设回复（或预设错误）；脚本耗尽后回显最后一条 User 消息，
//! 便于本地跑通路由与规划-执行流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预设一条成功回复
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(content.into()));
        self
    }

    /// 预设一条失败（模拟超时、网络或提供方错误）
    pub fn failure(self, reason: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(reason.into()));
        self
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}
