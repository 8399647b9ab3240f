//! 当前日期工具（无副作用）

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

/// 返回当前日期（YYYY-MM-DD）
pub struct CurrentDateTool;

#[async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &str {
        "current_date"
    }

    fn description(&self) -> &str {
        "Get the current date in YYYY-MM-DD format. Useful when the task mentions relative dates like 'next Tuesday'."
    }

    async fn execute(&self, _args: Value) -> Result<String, AgentError> {
        Ok(chrono::Local::now().format("%Y-%m-%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_date_format() {
        let out = CurrentDateTool.execute(Value::Null).await.unwrap();
        // YYYY-MM-DD
        assert_eq!(out.len(), 10);
        assert_eq!(out.as_bytes()[4], b'-');
        assert_eq!(out.as_bytes()[7], b'-');
    }
}
