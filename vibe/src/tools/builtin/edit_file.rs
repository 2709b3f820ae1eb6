//! edit_file tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::checkpoint::ChangeType;
use crate::tools::{RiskLevel, Tool, ToolCategory, ToolContext, ToolResult};

/// Replace an exact string in a file
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace an exact string in a file. The old string must match exactly once unless replace_all is set."
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
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": { "type": "boolean", "description": "Replace every occurrence" }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(run_id = %ctx.run_id, "EditFileTool::execute: called");
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };
        let Some(old_string) = input["old_string"].as_str() else {
            return ToolResult::error("old_string is required");
        };
        let Some(new_string) = input["new_string"].as_str() else {
            return ToolResult::error("new_string is required");
        };
        let replace_all = input["replace_all"].as_bool().unwrap_or(false);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read {path}: {e}")),
        };

        let occurrences = content.matches(old_string).count();
        if occurrences == 0 {
            return ToolResult::error(format!("old_string not found in {path}"));
        }
        if occurrences > 1 && !replace_all {
            return ToolResult::error(format!(
                "old_string matches {occurrences} times in {path}; pass replace_all or disambiguate"
            ));
        }

        ctx.track_mutation(&full_path, ChangeType::Modify).await;

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        if let Err(e) = tokio::fs::write(&full_path, &updated).await {
            return ToolResult::error(format!("Failed to write {path}: {e}"));
        }

        ctx.record_new_content(&full_path, &updated).await;

        debug!(%occurrences, "EditFileTool::execute: edit applied");
        ToolResult::success(format!("Replaced {occurrences} occurrence(s) in {path}")).with_files(vec![full_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_edit_single_occurrence() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "hello world").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "old_string": "world", "new_string": "there"}),
                &ctx,
            )
            .await;

        assert!(result.success);
        assert_eq!(std::fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hello there");
    }

    #[tokio::test]
    async fn test_edit_ambiguous_requires_replace_all() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "x x x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let refused = EditFileTool
            .execute(serde_json::json!({"path": "a.txt", "old_string": "x", "new_string": "y"}), &ctx)
            .await;
        assert!(!refused.success);

        let replaced = EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "old_string": "x", "new_string": "y", "replace_all": true}),
                &ctx,
            )
            .await;
        assert!(replaced.success);
        assert_eq!(std::fs::read_to_string(temp.path().join("a.txt")).unwrap(), "y y y");
    }

    #[tokio::test]
    async fn test_edit_missing_string() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "content").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = EditFileTool
            .execute(
                serde_json::json!({"path": "a.txt", "old_string": "absent", "new_string": "x"}),
                &ctx,
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }
}
