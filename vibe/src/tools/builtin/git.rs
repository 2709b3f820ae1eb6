//! git tools - status and diff

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

async fn run_git(args: &[&str], ctx: &ToolContext) -> ToolResult {
    debug!(?args, "run_git: called");
    let output = match Command::new("git").args(args).current_dir(&ctx.workspace).output().await {
        Ok(o) => o,
        Err(e) => return ToolResult::error(format!("Failed to run git: {e}")),
    };

    let exit_code = output.status.code().unwrap_or(-1);
    if output.status.success() {
        ToolResult::success(String::from_utf8_lossy(&output.stdout).to_string()).with_exit_code(exit_code)
    } else {
        ToolResult::error(String::from_utf8_lossy(&output.stderr).to_string()).with_exit_code(exit_code)
    }
}

/// Porcelain status of the workspace repository
pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &'static str {
        "git_status"
    }

    fn description(&self) -> &'static str {
        "Show the git status of the workspace (porcelain format)."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        run_git(&["status", "--porcelain"], ctx).await
    }
}

/// Unstaged diff of the workspace repository
pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &'static str {
        "git_diff"
    }

    fn description(&self) -> &'static str {
        "Show the diff of uncommitted changes, optionally for one path."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Limit the diff to one path" }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        match input["path"].as_str() {
            Some(path) => run_git(&["diff", "HEAD", "--", path], ctx).await,
            None => run_git(&["diff", "HEAD"], ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn git_workspace() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test"],
            vec!["config", "user.name", "test"],
        ] {
            Command::new("git").args(&args).current_dir(temp.path()).output().await.unwrap();
        }
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_git_status_lists_untracked() {
        let (temp, ctx) = git_workspace().await;
        std::fs::write(temp.path().join("new.txt"), "x").unwrap();

        let result = GitStatusTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.success);
        assert!(result.output.contains("new.txt"));
    }

    #[tokio::test]
    async fn test_git_status_outside_repo_fails() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = GitStatusTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.success);
    }
}
