//! run_command tool - sandboxed shell execution

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::tools::policy;
use crate::tools::{RiskLevel, Tool, ToolCategory, ToolContext, ToolResult};

/// Run a shell command inside the workspace, under the blocklist and
/// resource limits
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Run a shell command in the workspace. Dangerous commands are blocked; output is size-capped."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command line" },
                "timeout_ms": { "type": "integer", "description": "Deadline override in milliseconds" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(run_id = %ctx.run_id, "RunCommandTool::execute: called");
        let Some(command) = input["command"].as_str() else {
            return ToolResult::error("command is required");
        };

        if let Some(blocked) = policy::blocked_command(command) {
            warn!(%command, %blocked, "RunCommandTool::execute: blocked by policy");
            return ToolResult::error(format!("Command blocked by policy: '{blocked}'"));
        }

        let timeout = input["timeout_ms"]
            .as_u64()
            .map(Duration::from_millis)
            .unwrap_or(ctx.limits.command_timeout);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to spawn command: {e}")),
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("Command failed: {e}")),
            Err(_) => {
                debug!(%command, ?timeout, "RunCommandTool::execute: deadline exceeded");
                return ToolResult::error(format!("Command timed out after {timeout:?}"));
            }
        };

        let cap = ctx.limits.max_output_bytes;
        let stdout = truncate_bytes(&output.stdout, cap);
        let stderr = truncate_bytes(&output.stderr, cap);
        let exit_code = output.status.code().unwrap_or(-1);

        let combined = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            stderr
        } else {
            format!("{stdout}\n--- stderr ---\n{stderr}")
        };

        debug!(%exit_code, output_len = combined.len(), "RunCommandTool::execute: finished");
        if output.status.success() {
            ToolResult::success(combined).with_exit_code(exit_code)
        } else {
            let mut result = ToolResult::error(format!("Command exited with code {exit_code}"));
            result.output = combined;
            result.with_exit_code(exit_code)
        }
    }
}

fn truncate_bytes(bytes: &[u8], cap: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > cap {
        format!("{}...\n[output truncated]", &text[..cap])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(dir.to_path_buf(), "test")
    }

    #[tokio::test]
    async fn test_run_command_success() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "echo hello"}), &ctx(temp.path()))
            .await;

        assert!(result.success);
        assert_eq!(result.output.trim(), "hello");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "exit 3"}), &ctx(temp.path()))
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_blocked_command_refused() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "rm -rf /"}), &ctx(temp.path()))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let temp = tempdir().unwrap();
        let result = RunCommandTool
            .execute(serde_json::json!({"command": "sleep 5", "timeout_ms": 50}), &ctx(temp.path()))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "x").unwrap();

        let result = RunCommandTool
            .execute(serde_json::json!({"command": "ls"}), &ctx(temp.path()))
            .await;
        assert!(result.output.contains("marker.txt"));
    }
}
