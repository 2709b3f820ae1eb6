//! fetch tool - fetch a URL and convert HTML to markdown

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::tools::{RiskLevel, Tool, ToolCategory, ToolContext, ToolResult};

/// Maximum response body accepted
const MAX_BODY_BYTES: usize = 1_000_000;

/// Output cap after conversion
const MAX_OUTPUT_CHARS: usize = 50_000;

/// Fetch content from a URL
pub struct FetchTool {
    http: reqwest::Client,
}

impl FetchTool {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for FetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch content from a URL. HTML is converted to markdown; JSON is pretty-printed."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch (http or https)" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        debug!(?input, "FetchTool::execute: called");
        let Some(url) = input["url"].as_str() else {
            return ToolResult::error("url is required");
        };

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::error("URL must start with http:// or https://");
        }

        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Failed to fetch URL: {e}")),
        };

        if !response.status().is_success() {
            return ToolResult::error(format!("HTTP error: {}", response.status()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to read response: {e}")),
        };

        if body.len() > MAX_BODY_BYTES {
            return ToolResult::error("Response too large (> 1MB)");
        }

        let output = if content_type.contains("text/html") || content_type.contains("application/xhtml") {
            html2md::rewrite_html(&body, false)
        } else if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
                Err(_) => body,
            }
        } else {
            body
        };

        let truncated = if output.len() > MAX_OUTPUT_CHARS {
            format!("{}...\n[truncated, {} chars total]", &output[..MAX_OUTPUT_CHARS], output.len())
        } else {
            output
        };

        ToolResult::success(truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = FetchTool::new().execute(serde_json::json!({"url": "not-a-url"}), &ctx).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("http"));
    }

    #[tokio::test]
    async fn test_fetch_missing_url() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = FetchTool::new().execute(serde_json::json!({}), &ctx).await;
        assert!(!result.success);
    }

    #[test]
    fn test_html_converts_to_markdown() {
        let md = html2md::rewrite_html("<h1>Title</h1><p>Body text</p>", false);
        assert!(md.contains("Title"));
        assert!(md.contains("Body text"));
    }
}
