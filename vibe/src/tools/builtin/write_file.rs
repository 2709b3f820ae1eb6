//! write_file tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::checkpoint::ChangeType;
use crate::tools::{RiskLevel, Tool, ToolCategory, ToolContext, ToolResult};

/// Write content to a file, tracking the mutation for rollback
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(run_id = %ctx.run_id, "WriteFileTool::execute: called");
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };
        let Some(content) = input["content"].as_str() else {
            return ToolResult::error("content is required");
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        // Capture pre-mutation state before anything touches the file
        let change_type = if full_path.exists() { ChangeType::Modify } else { ChangeType::Create };
        ctx.track_mutation(&full_path, change_type).await;

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create directories: {e}"));
        }

        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolResult::error(format!("Failed to write file: {e}"));
        }

        ctx.record_new_content(&full_path, content).await;

        debug!(bytes = content.len(), "WriteFileTool::execute: file written");
        ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path)).with_files(vec![full_path])
    }
}
