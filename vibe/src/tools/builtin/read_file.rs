//! read_file tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

/// Read a file's contents, optionally a line range
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file's contents. Supports an optional line offset and limit."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace" },
                "offset": { "type": "integer", "description": "First line to return (1-indexed)" },
                "limit": { "type": "integer", "description": "Maximum number of lines" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "ReadFileTool::execute: called");
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read {path}: {e}")),
        };

        let offset = input["offset"].as_u64().map(|o| o.max(1) as usize).unwrap_or(1);
        let limit = input["limit"].as_u64().map(|l| l as usize);

        let output = match limit {
            None if offset == 1 => content,
            _ => {
                let lines: Vec<&str> = content.lines().collect();
                let end = limit.map(|l| (offset - 1 + l).min(lines.len())).unwrap_or(lines.len());
                lines[(offset - 1).min(lines.len())..end].join("\n")
            }
        };

        ToolResult::success(output)
    }
}
