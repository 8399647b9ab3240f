//! 有界指数退避重试
//!
//! 只包裹 Plan-and-Execute 的执行步骤这一处顶层调用；不用于资源获取，
//! 也不用于路由。末次失败后原样返回根因错误（不包装），保证上层的错误
//! 分类仍然对着真实原因。取消不重试。

use std::future::Future;
use std::time::Duration;

use crate::config::RetrySection;
use crate::core::AgentError;

/// 重试策略：默认 3 次，退避 4s -> 8s，封顶 10s
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(4),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            base: Duration::from_secs(section.backoff_base_secs),
            cap: Duration::from_secs(section.backoff_cap_secs),
        }
    }

    /// 第 attempt 次失败后的等待时长（attempt 从 1 开始）
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// 以策略重试异步调用；op 每次被调用都会构造一个全新的 future
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, AgentError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e @ AgentError::Cancelled(_)) => return Err(e),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "attempt failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
