//! 能力集：注册表、执行器与各工具族（日期、用户输入、浏览器、沙箱、搜索）

pub mod browser;
pub mod datetime;
pub mod executor;
pub mod prompt;
pub mod registry;
pub mod sandbox;
pub mod search;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

pub use browser::{BrowserClickTool, BrowserFillTool, BrowserNavigateTool, BrowserReadPageTool};
#[cfg(feature = "browser")]
pub use browser::ChromeSession;
pub use datetime::CurrentDateTool;
pub use executor::ToolExecutor;
pub use prompt::{AskUserTool, PromptHandler, RejectPrompt, StdinPrompt};
pub use registry::{Tool, ToolRegistry};
pub use sandbox::{LocalSandbox, SandboxReadFileTool, SandboxRunTool, SandboxWriteFileTool};
pub use search::SearchTool;

use crate::config::AppConfig;
use crate::core::{AgentError, AutomationSession, SandboxSession, SessionFactory};

/// 生产用会话工厂：本地沙箱 + Headless Chrome
///
/// 浏览器会话需启用 feature "browser"；未启用时 automation 获取直接失败，
/// 错误信息指明缺的是哪个资源。
pub struct LocalSessionFactory {
    workspace_root: PathBuf,
    allowed_commands: Vec<String>,
    sandbox_timeout_secs: u64,
    #[cfg(feature = "browser")]
    headless: bool,
    #[cfg(feature = "browser")]
    browser_timeout_secs: u64,
}

impl LocalSessionFactory {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            workspace_root: config
                .sandbox
                .workspace_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("workspace")),
            allowed_commands: config.sandbox.allowed_commands.clone(),
            sandbox_timeout_secs: config.sandbox.timeout_secs,
            #[cfg(feature = "browser")]
            headless: config.browser.headless,
            #[cfg(feature = "browser")]
            browser_timeout_secs: config.browser.timeout_secs,
        }
    }
}

#[async_trait]
impl SessionFactory for LocalSessionFactory {
    async fn acquire_sandbox(&self) -> Result<Arc<dyn SandboxSession>, AgentError> {
        let sandbox = LocalSandbox::create(
            &self.workspace_root,
            self.allowed_commands.clone(),
            self.sandbox_timeout_secs,
        )
        .await?;
        Ok(Arc::new(sandbox))
    }

    #[cfg(feature = "browser")]
    async fn acquire_automation(&self) -> Result<Arc<dyn AutomationSession>, AgentError> {
        let session = ChromeSession::launch(self.headless, self.browser_timeout_secs).await?;
        Ok(Arc::new(session))
    }

    #[cfg(not(feature = "browser"))]
    async fn acquire_automation(&self) -> Result<Arc<dyn AutomationSession>, AgentError> {
        Err(AgentError::ResourceAcquisition {
            resource: "automation",
            reason: "browser support not compiled in (enable the 'browser' feature)".to_string(),
        })
    }
}

/// 组装一次 Plan-and-Execute 调用的完整工具注册表，绑定到已获取的会话
pub fn build_tool_registry(
    sandbox: Arc<dyn SandboxSession>,
    automation: Arc<dyn AutomationSession>,
    prompt_handler: Arc<dyn PromptHandler>,
    config: &AppConfig,
) -> ToolRegistry {
    let mut tools = ToolRegistry::new();

    tools.register(CurrentDateTool);
    tools.register(AskUserTool::new(prompt_handler));

    tools.register(BrowserNavigateTool::new(Arc::clone(&automation)));
    tools.register(BrowserClickTool::new(Arc::clone(&automation)));
    tools.register(BrowserFillTool::new(Arc::clone(&automation)));
    tools.register(BrowserReadPageTool::new(automation));

    tools.register(SandboxRunTool::new(Arc::clone(&sandbox)));
    tools.register(SandboxWriteFileTool::new(Arc::clone(&sandbox)));
    tools.register(SandboxReadFileTool::new(sandbox));

    tools.register(SearchTool::new(
        config.search.timeout_secs,
        config.search.max_results,
        config.search.max_result_chars,
    ));

    tools
}
