//! Multi-edit primitive - an ordered batch of file edits
//!
//! Each edit is tracked through the checkpoint store before application.
//! The first failure halts the batch; already-applied edits stay in place so
//! the caller can decide to roll back the enclosing checkpoint.

use serde_json::Value;
use tracing::{debug, warn};

use super::{PrimitiveContext, PrimitiveError, determinism};

/// Input: `{"edits": [{"path": "...", "old_string": "...", "new_string": "..."}
/// | {"path": "...", "content": "..."}]}`
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    debug!(run_id = %ctx.run_id, "multi_edit::run: called");
    let Some(edits) = input["edits"].as_array() else {
        return Err(PrimitiveError::Validation("edits array is required".to_string()));
    };
    if edits.is_empty() {
        return Err(PrimitiveError::Validation("edits must not be empty".to_string()));
    }

    let mut statuses: Vec<Value> = Vec::with_capacity(edits.len());
    let mut halted = false;

    for (n, edit) in edits.iter().enumerate() {
        let Some(path) = edit["path"].as_str() else {
            return Err(PrimitiveError::Validation(format!("edit {n} is missing a path")));
        };

        let (tool, args) = if edit.get("content").is_some() {
            (
                "write_file",
                serde_json::json!({ "path": path, "content": edit["content"] }),
            )
        } else {
            (
                "edit_file",
                serde_json::json!({
                    "path": path,
                    "old_string": edit["old_string"],
                    "new_string": edit["new_string"],
                    "replace_all": edit["replace_all"].as_bool().unwrap_or(false),
                }),
            )
        };

        let result = determinism::call_tool(ctx, tool, args).await?;
        let success = result["success"].as_bool().unwrap_or(false);

        statuses.push(serde_json::json!({
            "path": path,
            "success": success,
            "detail": if success { result["output"].clone() } else { result["error"].clone() },
        }));

        if !success {
            warn!(%path, edit = n, "multi_edit::run: edit failed, halting batch");
            halted = true;
            break;
        }
    }

    let applied = statuses.iter().filter(|s| s["success"] == true).count();
    Ok(serde_json::json!({
        "success": !halted,
        "applied": applied,
        "total": edits.len(),
        "files": statuses,
    }))
}
