//! 搜索工具：限定条数的文本搜索
//!
//! 走 DuckDuckGo 的 HTML 端点，正则提取标题 / 链接 / 摘要，至多返回
//! max_results 条；解析不出结果时回退为 html2text 提取的页面文本。
//! 单条结果超过 max_result_chars 时截断并追加 ...[truncated]。

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Search 工具：bounded-result-count 文本搜索
pub struct SearchTool {
    client: Client,
    max_results: usize,
    max_result_chars: usize,
}

/// 去掉结果片段里的标签与多余空白
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

impl SearchTool {
    pub fn new(timeout_secs: u64, max_results: usize, max_result_chars: usize) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_results: max_results.max(1),
            max_result_chars,
        }
    }

    /// 从结果页提取至多 max_results 条「标题 / 链接 / 摘要」
    fn parse_results(&self, html: &str) -> Vec<String> {
        // DuckDuckGo HTML 版的结果链接与摘要节点
        let link_re =
            Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
                .expect("static regex");
        let snippet_re =
            Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).expect("static regex");

        let snippets: Vec<String> = snippet_re
            .captures_iter(html)
            .map(|c| strip_tags(&c[1]))
            .collect();

        link_re
            .captures_iter(html)
            .take(self.max_results)
            .enumerate()
            .map(|(i, c)| {
                let url = c[1].to_string();
                let title = strip_tags(&c[2]);
                let snippet = snippets.get(i).cloned().unwrap_or_default();
                format!("{}. {} — {}\n   {}", i + 1, title, url, snippet)
            })
            .collect()
    }

    async fn search(&self, query: &str) -> Result<String, AgentError> {
        let resp = self
            .client
            .post(SEARCH_ENDPOINT)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::ToolTimeout("search request timed out".to_string())
                } else {
                    AgentError::ToolExecutionFailed(format!("Request failed: {}", e))
                }
            })?;
        if !resp.status().is_success() {
            return Err(AgentError::ToolExecutionFailed(format!(
                "HTTP {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read body: {}", e)))?;

        let results = self.parse_results(&body);
        if results.is_empty() {
            // 结构解析失败时退回整页可读文本
            let text = from_read(body.as_bytes(), 120)
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            if text.is_empty() {
                return Err(AgentError::ToolExecutionFailed(
                    "No search results".to_string(),
                ));
            }
            return Ok(truncate(text, self.max_result_chars));
        }

        Ok(truncate(results.join("\n"), self.max_result_chars))
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Text web search with a bounded number of results. Args: {\"query\": \"...\"}. Returns numbered results with title, URL and snippet."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("").trim();
        if query.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing query".to_string()));
        }
        tracing::info!(query = %query, "search tool query");
        self.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <div class="result">
          <a class="result__a" href="https://example.com/nvda">NVIDIA <b>stock</b></a>
          <a class="result__snippet">NVDA price today is <b>high</b>.</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.com/amd">AMD stock</a>
          <a class="result__snippet">AMD price today.</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.com/intc">Intel stock</a>
          <a class="result__snippet">INTC price today.</a>
        </div>
    "#;

    #[test]
    fn test_parse_bounded_results() {
        let tool = SearchTool::new(5, 2, 2000);
        let results = tool.parse_results(SAMPLE);
        assert_eq!(results.len(), 2);
        assert!(results[0].contains("NVIDIA stock"));
        assert!(results[0].contains("https://example.com/nvda"));
        assert!(results[0].contains("NVDA price today is high."));
        assert!(results[1].contains("AMD"));
    }

    #[test]
    fn test_truncation() {
        let out = truncate("x".repeat(50), 10);
        assert!(out.ends_with("...[truncated]"));
        assert!(out.starts_with("xxxxxxxxxx"));
    }
}
