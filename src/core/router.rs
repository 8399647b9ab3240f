//! 任务路由：direct_answer 还是 plan_and_execute
//!
//! 调用分类 LLM（约束为只返回两个字面 token 之一）。输出不合法或调用失败时
//! 记日志、发一条 log 事件说明回退，并采用默认路由 —— 分类错误绝不终止任务。
//! 默认路由取 DirectAnswer：误判为简单任务只损失能力，不会白白拉起浏览器与沙箱。

use std::sync::Arc;

use crate::core::TaskChannel;
use crate::llm::{LlmClient, Message};

/// 任务的二值分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// 单次补全即可回答
    DirectAnswer,
    /// 需要规划并驱动外部工具
    PlanAndExecute,
}

/// 分类失败或输出不合法时采用的路由
pub const DEFAULT_ROUTE: Route = Route::DirectAnswer;

const ROUTER_SYSTEM_PROMPT: &str = "You are a task classification bot. Your only job is to \
analyze the user query and pick exactly one of the two options that best describes it: \
'direct_answer' or 'plan_and_execute'.\n\
Return only one of these two words, with no explanation, punctuation or extra text.\n\n\
- If the task is simple Q&A, conversation or summarization, return: direct_answer\n\
- If the task needs tools (browser, search engine, command execution) to complete, \
return: plan_and_execute";

/// 路由器：持有分类 LLM；classify 从不失败、从不返回未识别的值
pub struct Router {
    llm: Arc<dyn LlmClient>,
}

impl Router {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 分类任务描述。内部不做重试；所有失败就地吸收并回退到默认路由。
    pub async fn classify(&self, description: &str, channel: &TaskChannel) -> Route {
        let messages = [
            Message::system(ROUTER_SYSTEM_PROMPT),
            Message::user(format!("User query: ```{}```", description)),
        ];

        match self.llm.complete(&messages).await {
            Ok(raw) => match raw.trim() {
                "direct_answer" => Route::DirectAnswer,
                "plan_and_execute" => Route::PlanAndExecute,
                other => {
                    tracing::warn!(
                        output = %other,
                        "router returned an unexpected token, falling back to default route"
                    );
                    channel.log("Routing produced an unexpected answer, falling back to direct answer mode.");
                    DEFAULT_ROUTE
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "routing call failed, falling back to default route");
                channel.log(format!(
                    "Routing failed: {}. Falling back to direct answer mode.",
                    e
                ));
                DEFAULT_ROUTE
            }
        }
    }
}
