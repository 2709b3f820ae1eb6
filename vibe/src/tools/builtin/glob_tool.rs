//! glob tool

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

/// Find files matching a glob pattern
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern, relative to the workspace."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern, e.g. src/**/*.rs" },
                "max_results": { "type": "integer", "description": "Cap on returned paths (default 200)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "GlobTool::execute: called");
        let Some(pattern) = input["pattern"].as_str() else {
            return ToolResult::error("pattern is required");
        };
        let max_results = input["max_results"].as_u64().unwrap_or(200) as usize;

        let full_pattern = ctx.workspace.join(pattern).to_string_lossy().to_string();
        let paths = match glob::glob(&full_pattern) {
            Ok(paths) => paths,
            Err(e) => return ToolResult::error(format!("Invalid glob pattern: {e}")),
        };

        let mut matches = Vec::new();
        for entry in paths.filter_map(|p| p.ok()) {
            let display = entry
                .strip_prefix(&ctx.workspace)
                .unwrap_or(&entry)
                .to_string_lossy()
                .to_string();
            matches.push(display);
            if matches.len() >= max_results {
                break;
            }
        }
        matches.sort_unstable();

        if matches.is_empty() {
            ToolResult::success("No files matched")
        } else {
            ToolResult::success(matches.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_glob_matches() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/main.rs"), "").unwrap();
        std::fs::write(temp.path().join("src/notes.md"), "").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = GlobTool.execute(serde_json::json!({"pattern": "src/*.rs"}), &ctx).await;

        assert!(result.success);
        assert_eq!(result.output, "src/main.rs");
    }

    #[tokio::test]
    async fn test_glob_no_matches() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = GlobTool.execute(serde_json::json!({"pattern": "*.zig"}), &ctx).await;
        assert!(result.success);
        assert_eq!(result.output, "No files matched");
    }
}
