//! TaskRunner：任务生命周期的唯一入口
//!
//! 路由 -> 直答或 Plan-and-Execute -> 终态翻译。所有错误在这里吸收为
//! TaskResult，事件流以 end 收尾；资源对在正常、出错、取消三条路径上
//! 都恰好释放一次。取消通过 select 竞速：运行 future 在竞速中被丢弃，
//! 释放在竞速之后的唯一出口执行。

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{
    AgentError, ResourceSet, RetryPolicy, Route, Router, SessionFactory, TaskChannel,
};
use crate::llm::{create_llm, LlmClient, Message};
use crate::plan::{Orchestrator, Planner, StepExecutor, DEFAULT_PLANNER_PROMPT};
use crate::tools::{build_tool_registry, PromptHandler, ToolExecutor};

const DIRECT_ANSWER_PROMPT: &str =
    "You are a helpful assistant. Answer the user's question directly and concisely.";

/// 一次任务：id 为 UUID 字符串
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub description: String,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
        }
    }
}

/// 任务终态三值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Error,
    Cancelled,
}

/// 对调用方可见的任务结果；run_task 从不返回 Err
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResult {
    pub fn completed(answer: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Completed,
            result: Some(answer.into()),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            result: None,
            message: Some(message.into()),
        }
    }

    /// 取消不携带部分结果
    pub fn cancelled() -> Self {
        Self {
            status: TaskStatus::Cancelled,
            result: None,
            message: Some("Task cancelled.".to_string()),
        }
    }
}

/// 任务运行器：按角色持有四个 LLM、会话工厂与用户输入通道
pub struct TaskRunner {
    router: Router,
    direct_llm: Arc<dyn LlmClient>,
    planner_llm: Arc<dyn LlmClient>,
    executor_llm: Arc<dyn LlmClient>,
    factory: Arc<dyn SessionFactory>,
    prompt_handler: Arc<dyn PromptHandler>,
    retry: RetryPolicy,
    config: AppConfig,
}

impl TaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router_llm: Arc<dyn LlmClient>,
        direct_llm: Arc<dyn LlmClient>,
        planner_llm: Arc<dyn LlmClient>,
        executor_llm: Arc<dyn LlmClient>,
        factory: Arc<dyn SessionFactory>,
        prompt_handler: Arc<dyn PromptHandler>,
        config: AppConfig,
    ) -> Self {
        Self {
            router: Router::new(router_llm),
            direct_llm,
            planner_llm,
            executor_llm,
            factory,
            prompt_handler,
            retry: RetryPolicy::from_config(&config.retry),
            config,
        }
    }

    /// 按配置的各角色 LLM 组装运行器
    pub fn from_config(
        config: AppConfig,
        factory: Arc<dyn SessionFactory>,
        prompt_handler: Arc<dyn PromptHandler>,
    ) -> Result<Self, AgentError> {
        let router_llm = create_llm(&config.llm.router)?;
        let direct_llm = create_llm(&config.llm.direct_answer)?;
        let planner_llm = create_llm(&config.llm.planner)?;
        let executor_llm = create_llm(&config.llm.executor)?;
        Ok(Self::new(
            router_llm,
            direct_llm,
            planner_llm,
            executor_llm,
            factory,
            prompt_handler,
            config,
        ))
    }

    /// 运行一个任务到终态。事件全部走 channel，末尾必有 end。
    pub async fn run_task(
        &self,
        task: &Task,
        channel: &TaskChannel,
        cancel: &CancellationToken,
    ) -> TaskResult {
        tracing::info!(task_id = %task.id, "task started");
        let outcome = self.drive(task, channel, cancel).await;

        let result = match outcome {
            Ok(answer) => {
                tracing::info!(task_id = %task.id, "task completed");
                channel.result(answer.clone());
                TaskResult::completed(answer)
            }
            Err(AgentError::Cancelled(reason)) => {
                tracing::info!(task_id = %task.id, reason = %reason, "task cancelled");
                channel.error("Task cancelled.");
                TaskResult::cancelled()
            }
            Err(e @ AgentError::Config(_)) => {
                // 内部配置问题不向客户端泄露细节
                tracing::error!(task_id = %task.id, error = %e, "task failed on internal error");
                let message = "An internal error occurred while processing the task.";
                channel.error(message);
                TaskResult::error(message)
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "task failed");
                let message = e.to_string();
                channel.error(message.clone());
                TaskResult::error(message)
            }
        };

        channel.end();
        result
    }

    async fn drive(
        &self,
        task: &Task,
        channel: &TaskChannel,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled("shutdown before routing".to_string()));
        }

        channel.log("Analyzing task type...");
        let route = self.router.classify(&task.description, channel).await;

        match route {
            Route::DirectAnswer => {
                channel.log("Answering directly...");
                tokio::select! {
                    answer = self.direct_answer(&task.description) => answer,
                    _ = cancel.cancelled() => {
                        Err(AgentError::Cancelled("shutdown during direct answer".to_string()))
                    }
                }
            }
            Route::PlanAndExecute => self.plan_and_execute(task, channel, cancel).await,
        }
    }

    async fn direct_answer(&self, description: &str) -> Result<String, AgentError> {
        let messages = [
            Message::system(DIRECT_ANSWER_PROMPT),
            Message::user(description),
        ];
        self.direct_llm
            .complete(&messages)
            .await
            .map_err(AgentError::Llm)
    }

    async fn plan_and_execute(
        &self,
        task: &Task,
        channel: &TaskChannel,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        // 获取前的检查点：关闭信号已到时不再供给任何会话
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled(
                "shutdown before resource acquisition".to_string(),
            ));
        }

        channel.log("Acquiring task resources...");
        let resources = ResourceSet::acquire(self.factory.as_ref()).await?;

        let tools = build_tool_registry(
            resources.sandbox(),
            resources.automation(),
            Arc::clone(&self.prompt_handler),
            &self.config,
        );
        let tool_timeout = self
            .config
            .browser
            .timeout_secs
            .max(self.config.sandbox.timeout_secs)
            + 5;
        let planner_prompt = self
            .config
            .plan
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_PLANNER_PROMPT.to_string());

        let mut orchestrator = Orchestrator::new(
            Planner::new(Arc::clone(&self.planner_llm), planner_prompt),
            StepExecutor::new(
                Arc::clone(&self.executor_llm),
                ToolExecutor::new(tools, tool_timeout),
                self.config.plan.max_tool_calls_per_step,
            ),
            self.retry,
        );

        // 竞速：取消方胜出时运行 future 随 select 丢弃
        let raced = tokio::select! {
            outcome = orchestrator.run(&task.description, channel) => Some(outcome),
            _ = cancel.cancelled() => None,
        };
        let outcome = match raced {
            Some(outcome) => outcome,
            None => {
                orchestrator.mark_cancelled();
                Err(AgentError::Cancelled("shutdown signal received".to_string()))
            }
        };

        // 三条退出路径（完成 / 失败 / 取消）共用的唯一释放点
        resources.release().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::resources::testing::MockSessionFactory;
    use crate::core::{task_channel, EventKind};
    use crate::llm::MockLlmClient;
    use crate::tools::RejectPrompt;

    const PLAN_REPLY: &str = "Plan:\n1. Do the work.\n<END_OF_PLAN>";

    fn runner(
        router: MockLlmClient,
        direct: MockLlmClient,
        planner: MockLlmClient,
        executor: MockLlmClient,
        factory: Arc<MockSessionFactory>,
    ) -> TaskRunner {
        TaskRunner::new(
            Arc::new(router),
            Arc::new(direct),
            Arc::new(planner),
            Arc::new(executor),
            factory,
            Arc::new(RejectPrompt),
            AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_direct_answer_skips_resources() {
        let factory = Arc::new(MockSessionFactory::default());
        let r = runner(
            MockLlmClient::new().reply("direct_answer"),
            MockLlmClient::new().reply("4"),
            MockLlmClient::new(),
            MockLlmClient::new(),
            Arc::clone(&factory),
        );
        let (channel, stream) = task_channel();
        let cancel = CancellationToken::new();

        let result = r.run_task(&Task::new("What is 2+2?"), &channel, &cancel).await;
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.result.as_deref(), Some("4"));
        assert_eq!(factory.sandbox_acquires.load(Ordering::SeqCst), 0);

        let events = stream.drain().await;
        assert_eq!(events.last().unwrap().kind, EventKind::End);
        assert!(events.iter().any(|e| e.kind == EventKind::Result));
    }

    #[tokio::test]
    async fn test_plan_and_execute_releases_on_success() {
        let factory = Arc::new(MockSessionFactory::default());
        let r = runner(
            MockLlmClient::new().reply("plan_and_execute"),
            MockLlmClient::new(),
            MockLlmClient::new().reply(PLAN_REPLY),
            MockLlmClient::new().reply("FINAL ANSWER: done"),
            Arc::clone(&factory),
        );
        let (channel, stream) = task_channel();
        let cancel = CancellationToken::new();

        let result = r.run_task(&Task::new("do a thing"), &channel, &cancel).await;
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(factory.sandbox_closes.load(Ordering::SeqCst), 1);
        assert_eq!(factory.automation_closes.load(Ordering::SeqCst), 1);

        // plan 事件先于 result
        let events = stream.drain().await;
        let plan_pos = events.iter().position(|e| e.kind == EventKind::Plan).unwrap();
        let result_pos = events.iter().position(|e| e.kind == EventKind::Result).unwrap();
        assert!(plan_pos < result_pos);
    }

    #[tokio::test]
    async fn test_acquisition_failure_is_terminal_error() {
        let factory = Arc::new(MockSessionFactory {
            fail_automation: true,
            ..Default::default()
        });
        let r = runner(
            MockLlmClient::new().reply("plan_and_execute"),
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            Arc::clone(&factory),
        );
        let (channel, stream) = task_channel();

        let result = r
            .run_task(&Task::new("t"), &channel, &CancellationToken::new())
            .await;
        assert_eq!(result.status, TaskStatus::Error);
        assert!(result.message.unwrap().contains("automation"));
        // 已供给的沙箱被收回
        assert_eq!(factory.sandbox_closes.load(Ordering::SeqCst), 1);

        let events = stream.drain().await;
        assert!(events.iter().any(|e| e.kind == EventKind::Error));
        assert_eq!(events.last().unwrap().kind, EventKind::End);
    }

    #[tokio::test]
    async fn test_cancel_before_acquisition_skips_provisioning() {
        let factory = Arc::new(MockSessionFactory::default());
        let r = runner(
            MockLlmClient::new().reply("plan_and_execute"),
            MockLlmClient::new(),
            MockLlmClient::new(),
            MockLlmClient::new(),
            Arc::clone(&factory),
        );
        let (channel, stream) = task_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = r.run_task(&Task::new("t"), &channel, &cancel).await;
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert!(result.result.is_none());
        assert_eq!(factory.sandbox_acquires.load(Ordering::SeqCst), 0);
        assert_eq!(factory.automation_acquires.load(Ordering::SeqCst), 0);

        let events = stream.drain().await;
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::Error && e.payload == "Task cancelled."));
        assert_eq!(events.last().unwrap().kind, EventKind::End);
    }
}
