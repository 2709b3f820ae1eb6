//! Execution primitive - routes a tool invocation through the registry

use serde_json::Value;
use tracing::debug;

use super::{PrimitiveContext, PrimitiveError, determinism};

/// Input: `{"tool": "...", "tool_args": {...}}` or the shell shorthand
/// `{"command": "..."}`.
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    debug!(run_id = %ctx.run_id, "execution::run: called");

    let (tool, args) = if let Some(command) = input["command"].as_str() {
        ("run_command", serde_json::json!({ "command": command }))
    } else if let Some(tool) = input["tool"].as_str() {
        let args = input.get("tool_args").or_else(|| input.get("args")).cloned().unwrap_or_else(|| serde_json::json!({}));
        (
            ctx.tools
                .get(tool)
                .map(|t| t.name())
                .ok_or_else(|| PrimitiveError::NotFound(format!("tool '{tool}'")))?,
            args,
        )
    } else {
        return Err(PrimitiveError::Validation(
            "either tool or command is required".to_string(),
        ));
    };

    determinism::call_tool(ctx, tool, args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests_support::context_with_responses;

    #[tokio::test]
    async fn test_execute_named_tool() {
        let (ctx, temp) = context_with_responses(vec![]).await;
        std::fs::create_dir(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();

        let output = run(
            &ctx,
            serde_json::json!({"tool": "list_directory", "tool_args": {"path": "src"}}),
        )
        .await
        .unwrap();

        assert_eq!(output["success"], true);
        assert!(output["output"].as_str().unwrap().contains("main.rs"));
        assert!(output["files_mutated"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_shell_shorthand() {
        let (ctx, _temp) = context_with_responses(vec![]).await;

        let output = run(&ctx, serde_json::json!({"command": "echo shorthand"})).await.unwrap();
        assert_eq!(output["success"], true);
        assert!(output["output"].as_str().unwrap().contains("shorthand"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let (ctx, _temp) = context_with_responses(vec![]).await;

        let err = run(&ctx, serde_json::json!({"tool": "nope"})).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_input_is_validation_error() {
        let (ctx, _temp) = context_with_responses(vec![]).await;

        let err = run(&ctx, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::Validation(_)));
    }
}
