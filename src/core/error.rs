//! 任务编排错误类型
//!
//! 对应任务终态的错误分类：资源获取失败、浏览器超时/网络错误、规划或执行失败、
//! 取消等。TaskRunner 在最外层将其翻译为统一的 TaskResult，不向调用方抛出。

use thiserror::Error;

/// 任务执行过程中可能出现的错误（资源、浏览器、LLM、工具、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 沙箱或浏览器会话获取失败，对任务是致命的；resource 标明失败的资源
    #[error("Failed to acquire {resource} session: {reason}")]
    ResourceAcquisition {
        resource: &'static str,
        reason: String,
    },

    #[error("Browser operation timed out")]
    AutomationTimeout,

    #[error("Browser or network error: {0}")]
    AutomationNetwork(String),

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    /// 由关闭信号触发，终态为 cancelled 而非 error，不携带部分结果
    #[error("Task cancelled: {0}")]
    Cancelled(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 是否为执行步骤中不可恢复的能力错误（不再反馈给 LLM，直接终止执行）
    pub fn is_fatal_capability_error(&self) -> bool {
        matches!(
            self,
            AgentError::AutomationTimeout
                | AgentError::AutomationNetwork(_)
                | AgentError::ResourceAcquisition { .. }
                | AgentError::Cancelled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_names_resource() {
        let e = AgentError::ResourceAcquisition {
            resource: "sandbox",
            reason: "provisioning refused".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("sandbox"));
        assert!(msg.contains("provisioning refused"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AgentError::AutomationTimeout.is_fatal_capability_error());
        assert!(AgentError::AutomationNetwork("reset".into()).is_fatal_capability_error());
        assert!(!AgentError::ToolExecutionFailed("bad args".into()).is_fatal_capability_error());
        assert!(!AgentError::UnknownTool("frobnicate".into()).is_fatal_capability_error());
    }
}
