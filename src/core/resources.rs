//! 资源生命周期：沙箱与浏览器会话的成对获取 / 释放
//!
//! 获取顺序固定：先沙箱后浏览器（沙箱供给更慢、更易失败，先失败可避免
//! 白启动较重的浏览器）。释放严格逆序，且在正常、出错、取消三条退出路径上
//! 各恰好执行一次；释放失败只记日志，绝不掩盖任务本身的结果。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;

/// 沙箱会话边界契约：命令执行与文件读写都在会话私有的工作目录内
#[async_trait]
pub trait SandboxSession: Send + Sync {
    /// 执行 shell 命令，返回合并的 stdout/stderr
    async fn run_command(&self, command: &str) -> Result<String, AgentError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<String, AgentError>;

    async fn read_file(&self, path: &str) -> Result<String, AgentError>;

    /// 释放会话；幂等性由 ResourceSet 保证，实现只需做一次清理
    async fn close(&self) -> Result<(), AgentError>;
}

/// 浏览器自动化会话边界契约；停滞映射为超时分类，断连映射为网络分类
#[async_trait]
pub trait AutomationSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<String, AgentError>;

    async fn click(&self, selector: &str) -> Result<String, AgentError>;

    async fn fill(&self, selector: &str, text: &str) -> Result<String, AgentError>;

    /// 提取当前页面的可读文本
    async fn read_page(&self) -> Result<String, AgentError>;

    async fn close(&self) -> Result<(), AgentError>;
}

/// 会话工厂：Plan-and-Execute 分支入口处按固定顺序调用
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn acquire_sandbox(&self) -> Result<Arc<dyn SandboxSession>, AgentError>;

    async fn acquire_automation(&self) -> Result<Arc<dyn AutomationSession>, AgentError>;
}

/// 一次 Plan-and-Execute 调用独占的资源对
pub struct ResourceSet {
    sandbox: Arc<dyn SandboxSession>,
    automation: Arc<dyn AutomationSession>,
    released: bool,
}

impl ResourceSet {
    /// 按固定顺序获取两个会话；浏览器获取失败时先收回已获取的沙箱再报错
    pub async fn acquire(factory: &dyn SessionFactory) -> Result<Self, AgentError> {
        let sandbox = factory.acquire_sandbox().await?;
        tracing::info!("sandbox session acquired");

        let automation = match factory.acquire_automation().await {
            Ok(a) => a,
            Err(e) => {
                if let Err(close_err) = sandbox.close().await {
                    tracing::warn!(error = %close_err, "failed to close sandbox after automation acquisition failure");
                }
                return Err(e);
            }
        };
        tracing::info!("automation session acquired");

        Ok(Self {
            sandbox,
            automation,
            released: false,
        })
    }

    pub fn sandbox(&self) -> Arc<dyn SandboxSession> {
        Arc::clone(&self.sandbox)
    }

    pub fn automation(&self) -> Arc<dyn AutomationSession> {
        Arc::clone(&self.automation)
    }

    /// 逆序释放（先浏览器后沙箱）。消费 self，调用后任何组件都不再持有会话。
    pub async fn release(mut self) {
        self.released = true;

        if let Err(e) = self.automation.close().await {
            tracing::warn!(error = %e, "automation session release failed");
        }
        if let Err(e) = self.sandbox.close().await {
            tracing::warn!(error = %e, "sandbox session release failed");
        }
        tracing::info!("resource set released");
    }
}

impl Drop for ResourceSet {
    fn drop(&mut self) {
        // release() 是唯一合法的退出方式；走到这里说明某条路径漏了释放
        if !self.released {
            tracing::warn!("resource set dropped without release; sessions may leak");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 资源相关测试替身：计数式工厂与会话

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// 记录获取 / 释放次数的假会话
    pub struct CountingSession {
        pub closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SandboxSession for CountingSession {
        async fn run_command(&self, command: &str) -> Result<String, AgentError> {
            Ok(format!("STDOUT:\nran {}\nSTDERR:\n", command))
        }

        async fn write_file(&self, path: &str, _content: &str) -> Result<String, AgentError> {
            Ok(format!("Successfully wrote to {}.", path))
        }

        async fn read_file(&self, _path: &str) -> Result<String, AgentError> {
            Ok("file contents".to_string())
        }

        async fn close(&self) -> Result<(), AgentError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl AutomationSession for CountingSession {
        async fn navigate(&self, url: &str) -> Result<String, AgentError> {
            Ok(format!("Navigated to {}.", url))
        }

        async fn click(&self, selector: &str) -> Result<String, AgentError> {
            Ok(format!("Clicked {}.", selector))
        }

        async fn fill(&self, selector: &str, _text: &str) -> Result<String, AgentError> {
            Ok(format!("Filled {}.", selector))
        }

        async fn read_page(&self) -> Result<String, AgentError> {
            Ok("page text".to_string())
        }

        async fn close(&self) -> Result<(), AgentError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 可配置失败点的工厂，记录两类会话的获取与释放
    #[derive(Default)]
    pub struct MockSessionFactory {
        pub sandbox_acquires: AtomicUsize,
        pub automation_acquires: AtomicUsize,
        pub sandbox_closes: Arc<AtomicUsize>,
        pub automation_closes: Arc<AtomicUsize>,
        pub fail_sandbox: bool,
        pub fail_automation: bool,
    }

    #[async_trait]
    impl SessionFactory for MockSessionFactory {
        async fn acquire_sandbox(&self) -> Result<Arc<dyn SandboxSession>, AgentError> {
            if self.fail_sandbox {
                return Err(AgentError::ResourceAcquisition {
                    resource: "sandbox",
                    reason: "mock refused".to_string(),
                });
            }
            self.sandbox_acquires.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingSession {
                closes: Arc::clone(&self.sandbox_closes),
            }))
        }

        async fn acquire_automation(&self) -> Result<Arc<dyn AutomationSession>, AgentError> {
            if self.fail_automation {
                return Err(AgentError::ResourceAcquisition {
                    resource: "automation",
                    reason: "mock refused".to_string(),
                });
            }
            self.automation_acquires.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingSession {
                closes: Arc::clone(&self.automation_closes),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::MockSessionFactory;
    use super::*;

    #[tokio::test]
    async fn test_acquire_then_release_exactly_once() {
        let factory = MockSessionFactory::default();
        let set = ResourceSet::acquire(&factory).await.unwrap();

        assert_eq!(factory.sandbox_acquires.load(Ordering::SeqCst), 1);
        assert_eq!(factory.automation_acquires.load(Ordering::SeqCst), 1);

        set.release().await;
        assert_eq!(factory.sandbox_closes.load(Ordering::SeqCst), 1);
        assert_eq!(factory.automation_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sandbox_failure_skips_automation() {
        let factory = MockSessionFactory {
            fail_sandbox: true,
            ..Default::default()
        };
        let Err(err) = ResourceSet::acquire(&factory).await else {
            panic!("sandbox acquisition should fail");
        };
        assert!(err.to_string().contains("sandbox"));
        assert_eq!(factory.automation_acquires.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_automation_failure_releases_sandbox() {
        let factory = MockSessionFactory {
            fail_automation: true,
            ..Default::default()
        };
        let Err(err) = ResourceSet::acquire(&factory).await else {
            panic!("automation acquisition should fail");
        };
        assert!(err.to_string().contains("automation"));
        // 沙箱已获取，必须被收回
        assert_eq!(factory.sandbox_closes.load(Ordering::SeqCst), 1);
    }
}
