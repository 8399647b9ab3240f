//! 浏览器自动化工具族：navigate / click / fill / read_page
//!
//! 工具只依赖 AutomationSession 契约；具体的 Chrome 会话实现需启用
//! feature "browser" 且系统已安装 Chrome/Chromium。停滞类失败映射为
//! AutomationTimeout，断连类失败映射为 AutomationNetwork。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, AutomationSession};
use crate::tools::Tool;

/// 页面文本返回上限，超出截断
const PAGE_TEXT_MAX_CHARS: usize = 8000;

/// navigate 工具
pub struct BrowserNavigateTool {
    session: Arc<dyn AutomationSession>,
}

impl BrowserNavigateTool {
    pub fn new(session: Arc<dyn AutomationSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for BrowserNavigateTool {
    fn name(&self) -> &str {
        "browser_navigate"
    }

    fn description(&self) -> &str {
        "Open a URL in the browser session. Args: {\"url\": \"https://...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute URL to open" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        if url.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing url".to_string()));
        }
        tracing::info!(url = %url, "browser navigate");
        self.session.navigate(url).await
    }
}

/// click 工具
pub struct BrowserClickTool {
    session: Arc<dyn AutomationSession>,
}

impl BrowserClickTool {
    pub fn new(session: Arc<dyn AutomationSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for BrowserClickTool {
    fn name(&self) -> &str {
        "browser_click"
    }

    fn description(&self) -> &str {
        "Click an element on the current page. Args: {\"selector\": \"css selector\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": { "type": "string", "description": "CSS selector of the element to click" }
            },
            "required": ["selector"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let selector = args.get("selector").and_then(|v| v.as_str()).unwrap_or("").trim();
        if selector.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing selector".to_string()));
        }
        self.session.click(selector).await
    }
}

/// fill 工具
pub struct BrowserFillTool {
    session: Arc<dyn AutomationSession>,
}

impl BrowserFillTool {
    pub fn new(session: Arc<dyn AutomationSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for BrowserFillTool {
    fn name(&self) -> &str {
        "browser_fill"
    }

    fn description(&self) -> &str {
        "Type text into an input element. Args: {\"selector\": \"css selector\", \"text\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": { "type": "string", "description": "CSS selector of the input" },
                "text": { "type": "string", "description": "Text to type" }
            },
            "required": ["selector", "text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let selector = args.get("selector").and_then(|v| v.as_str()).unwrap_or("").trim();
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
        if selector.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing selector".to_string()));
        }
        self.session.fill(selector, text).await
    }
}

/// read_page 工具
pub struct BrowserReadPageTool {
    session: Arc<dyn AutomationSession>,
}

impl BrowserReadPageTool {
    pub fn new(session: Arc<dyn AutomationSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for BrowserReadPageTool {
    fn name(&self) -> &str {
        "browser_read_page"
    }

    fn description(&self) -> &str {
        "Extract the readable text of the current page. No args."
    }

    async fn execute(&self, _args: Value) -> Result<String, AgentError> {
        let text = self.session.read_page().await?;
        let len = text.chars().count();
        if len > PAGE_TEXT_MAX_CHARS {
            Ok(text.chars().take(PAGE_TEXT_MAX_CHARS).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(text)
        }
    }
}

#[cfg(feature = "browser")]
pub use chrome::ChromeSession;

#[cfg(feature = "browser")]
mod chrome {
    //! Headless Chrome 实现的 AutomationSession

    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use headless_chrome::{Browser, LaunchOptions, Tab};

    use crate::core::{AgentError, AutomationSession};

    /// 把 headless_chrome 的字符串错误映射到超时 / 网络分类
    fn classify(context: &str, e: impl std::fmt::Display) -> AgentError {
        let msg = e.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            AgentError::AutomationTimeout
        } else {
            AgentError::AutomationNetwork(format!("{}: {}", context, msg))
        }
    }

    /// 一个浏览器进程 + 一个持久 Tab 构成一次自动化会话
    pub struct ChromeSession {
        inner: Mutex<Option<(Browser, Arc<Tab>)>>,
    }

    impl ChromeSession {
        /// 启动 Chrome；失败归类为 automation 资源获取失败
        pub async fn launch(headless: bool, timeout_secs: u64) -> Result<Self, AgentError> {
            let launched = tokio::task::spawn_blocking(move || {
                let options = LaunchOptions::default_builder()
                    .headless(headless)
                    .idle_browser_timeout(std::time::Duration::from_secs(timeout_secs * 10))
                    .build()
                    .map_err(|e| e.to_string())?;
                let browser = Browser::new(options).map_err(|e| e.to_string())?;
                let tab = browser.new_tab().map_err(|e| e.to_string())?;
                tab.set_default_timeout(std::time::Duration::from_secs(timeout_secs));
                Ok::<_, String>((browser, tab))
            })
            .await
            .map_err(|e| AgentError::ResourceAcquisition {
                resource: "automation",
                reason: format!("task join: {}", e),
            })?
            .map_err(|e| AgentError::ResourceAcquisition {
                resource: "automation",
                reason: e,
            })?;

            Ok(Self {
                inner: Mutex::new(Some(launched)),
            })
        }

        fn tab(&self) -> Result<Arc<Tab>, AgentError> {
            self.inner
                .lock()
                .unwrap()
                .as_ref()
                .map(|(_, tab)| Arc::clone(tab))
                .ok_or_else(|| AgentError::AutomationNetwork("session closed".to_string()))
        }
    }

    #[async_trait]
    impl AutomationSession for ChromeSession {
        async fn navigate(&self, url: &str) -> Result<String, AgentError> {
            let tab = self.tab()?;
            let url = url.to_string();
            tokio::task::spawn_blocking(move || {
                tab.navigate_to(&url).map_err(|e| classify("Navigate failed", e))?;
                tab.wait_for_element("body")
                    .map_err(|e| classify("Page load failed", e))?;
                Ok(format!("Navigated to {}.", url))
            })
            .await
            .map_err(|e| AgentError::AutomationNetwork(format!("task join: {}", e)))?
        }

        async fn click(&self, selector: &str) -> Result<String, AgentError> {
            let tab = self.tab()?;
            let selector = selector.to_string();
            tokio::task::spawn_blocking(move || {
                tab.wait_for_element(&selector)
                    .map_err(|e| classify("Element not found", e))?
                    .click()
                    .map_err(|e| classify("Click failed", e))?;
                Ok(format!("Clicked {}.", selector))
            })
            .await
            .map_err(|e| AgentError::AutomationNetwork(format!("task join: {}", e)))?
        }

        async fn fill(&self, selector: &str, text: &str) -> Result<String, AgentError> {
            let tab = self.tab()?;
            let selector = selector.to_string();
            let text = text.to_string();
            tokio::task::spawn_blocking(move || {
                tab.wait_for_element(&selector)
                    .map_err(|e| classify("Element not found", e))?
                    .click()
                    .map_err(|e| classify("Focus failed", e))?;
                tab.type_str(&text).map_err(|e| classify("Type failed", e))?;
                Ok(format!("Filled {}.", selector))
            })
            .await
            .map_err(|e| AgentError::AutomationNetwork(format!("task join: {}", e)))?
        }

        async fn read_page(&self) -> Result<String, AgentError> {
            let tab = self.tab()?;
            tokio::task::spawn_blocking(move || {
                let content = tab
                    .get_content()
                    .map_err(|e| classify("Get content failed", e))?;
                Ok(html2text::from_read(content.as_bytes(), 120).unwrap_or(content))
            })
            .await
            .map_err(|e| AgentError::AutomationNetwork(format!("task join: {}", e)))?
        }

        async fn close(&self) -> Result<(), AgentError> {
            let taken = self.inner.lock().unwrap().take();
            if let Some((browser, tab)) = taken {
                tokio::task::spawn_blocking(move || {
                    let _ = tab.close(false);
                    drop(browser);
                })
                .await
                .map_err(|e| AgentError::AutomationNetwork(format!("task join: {}", e)))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::testing::CountingSession;
    use std::sync::atomic::AtomicUsize;

    fn session() -> Arc<dyn AutomationSession> {
        Arc::new(CountingSession {
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[tokio::test]
    async fn test_navigate_requires_url() {
        let tool = BrowserNavigateTool::new(session());
        assert!(tool.execute(serde_json::json!({})).await.is_err());
        let ok = tool
            .execute(serde_json::json!({"url": "https://example.com"}))
            .await
            .unwrap();
        assert!(ok.contains("example.com"));
    }

    #[tokio::test]
    async fn test_fill_requires_selector() {
        let tool = BrowserFillTool::new(session());
        assert!(tool
            .execute(serde_json::json!({"text": "hello"}))
            .await
            .is_err());
    }
}
