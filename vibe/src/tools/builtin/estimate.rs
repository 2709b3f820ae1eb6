//! estimate_tokens tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use contextkit::estimate_tokens;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

/// Estimate token cost of a file or literal text
pub struct EstimateTokensTool;

#[async_trait]
impl Tool for EstimateTokensTool {
    fn name(&self) -> &'static str {
        "estimate_tokens"
    }

    fn description(&self) -> &'static str {
        "Estimate token cost for a file or a text snippet, with a per-category breakdown."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to estimate" },
                "text": { "type": "string", "description": "Literal text to estimate" }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "EstimateTokensTool::execute: called");

        let content = if let Some(text) = input["text"].as_str() {
            text.to_string()
        } else if let Some(path) = input["path"].as_str() {
            let full_path = match ctx.validate_path(Path::new(path)) {
                Ok(p) => p,
                Err(e) => return ToolResult::error(e.to_string()),
            };
            match tokio::fs::read_to_string(&full_path).await {
                Ok(c) => c,
                Err(e) => return ToolResult::error(format!("Failed to read {path}: {e}")),
            }
        } else {
            return ToolResult::error("either path or text is required");
        };

        let est = estimate_tokens(&content);
        ToolResult::success(format!(
            "total: {} (code: {}, comments: {}, strings: {}, whitespace: {})",
            est.total, est.code, est.comment, est.string, est.whitespace
        ))
    }
}
