//! Orchestrator：Plan-and-Execute 的阶段机
//!
//! 规划只做一次，plan 事件恰好发出一次；重试只包裹执行步骤。取消发生时
//! 由外层（TaskRunner 的 select 竞速）丢弃运行 future，再调 mark_cancelled
//! 把阶段钉到 Cancelled。

use crate::core::{with_retry, AgentError, RetryPolicy, TaskChannel};
use crate::plan::{Plan, Planner, StepExecutor};

/// 编排阶段；phase() 暴露给运行器与测试观察
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Planning,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

pub struct Orchestrator {
    planner: Planner,
    executor: StepExecutor,
    retry: RetryPolicy,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(planner: Planner, executor: StepExecutor, retry: RetryPolicy) -> Self {
        Self {
            planner,
            executor,
            retry,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 外层竞速判定取消后调用；运行 future 此时已被丢弃
    pub fn mark_cancelled(&mut self) {
        self.phase = Phase::Cancelled;
    }

    /// 规划一次，执行（带重试），返回最终答案
    pub async fn run(&mut self, task: &str, channel: &TaskChannel) -> Result<String, AgentError> {
        self.phase = Phase::Planning;
        channel.log("Generating plan...");

        let plan: Plan = match self.planner.plan(task).await {
            Ok(plan) => plan,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e);
            }
        };
        tracing::info!(steps = plan.steps.len(), "plan generated");
        channel.plan(plan.text.clone());

        self.phase = Phase::Executing;
        let executor = &self.executor;
        let result = with_retry(self.retry, |attempt| {
            if attempt > 1 {
                channel.log(format!("Retrying execution (attempt {})...", attempt));
            }
            executor.run(task, &plan, channel)
        })
        .await;

        match result {
            Ok(answer) => {
                self.phase = Phase::Completed;
                Ok(answer)
            }
            Err(e) => {
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{task_channel, EventKind};
    use crate::llm::MockLlmClient;
    use crate::plan::DEFAULT_PLANNER_PROMPT;
    use crate::tools::{ToolExecutor, ToolRegistry};

    const PLAN_REPLY: &str = "Plan:\n1. Answer the question.\n<END_OF_PLAN>";

    fn orchestrator(planner_llm: MockLlmClient, executor_llm: MockLlmClient) -> Orchestrator {
        Orchestrator::new(
            Planner::new(Arc::new(planner_llm), DEFAULT_PLANNER_PROMPT),
            StepExecutor::new(Arc::new(executor_llm), ToolExecutor::new(ToolRegistry::new(), 5), 4),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_successful_run_emits_plan_once() {
        let mut orch = orchestrator(
            MockLlmClient::new().reply(PLAN_REPLY),
            MockLlmClient::new().reply("FINAL ANSWER: 42"),
        );
        let (channel, stream) = task_channel();

        let answer = orch.run("the question", &channel).await.unwrap();
        assert_eq!(answer, "42");
        assert_eq!(orch.phase(), Phase::Completed);
        drop(channel);

        let events = stream.drain().await;
        let plan_events: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::Plan)
            .collect();
        assert_eq!(plan_events.len(), 1);
        assert!(plan_events[0].payload.contains("Answer the question"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_emitted_once_even_when_execution_retries() {
        // 两次执行失败（非致命）后第三次成功；规划 LLM 只会被问一次
        let mut orch = orchestrator(
            MockLlmClient::new().reply(PLAN_REPLY),
            MockLlmClient::new()
                .failure("upstream 500")
                .failure("upstream 500")
                .reply("FINAL ANSWER: recovered"),
        );
        let (channel, stream) = task_channel();

        let answer = orch.run("q", &channel).await.unwrap();
        assert_eq!(answer, "recovered");
        drop(channel);

        let events = stream.drain().await;
        let plan_count = events.iter().filter(|e| e.kind == EventKind::Plan).count();
        assert_eq!(plan_count, 1);
        assert!(events
            .iter()
            .any(|e| e.payload.starts_with("Retrying execution (attempt 2)")));
    }

    #[tokio::test]
    async fn test_planning_failure_emits_no_plan_event() {
        let mut orch = orchestrator(
            MockLlmClient::new().reply("I refuse to make a plan."),
            MockLlmClient::new(),
        );
        let (channel, stream) = task_channel();

        let err = orch.run("q", &channel).await.unwrap_err();
        assert!(matches!(err, AgentError::Planning(_)));
        assert_eq!(orch.phase(), Phase::Failed);
        drop(channel);

        let events = stream.drain().await;
        assert!(events.iter().all(|e| e.kind != EventKind::Plan));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_with_root_cause() {
        let mut orch = orchestrator(
            MockLlmClient::new().reply(PLAN_REPLY),
            MockLlmClient::new()
                .failure("boom 1")
                .failure("boom 2")
                .failure("boom 3"),
        );
        let (channel, _stream) = task_channel();

        let err = orch.run("q", &channel).await.unwrap_err();
        assert_eq!(orch.phase(), Phase::Failed);
        assert!(matches!(err, AgentError::Llm(ref m) if m == "boom 3"));
    }
}
