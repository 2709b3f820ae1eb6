//! memory tools - remember and recall through the session store
//!
//! Entries are keyed by a hash of their content under the `memory/` prefix in
//! the persistence_items table.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

/// Content-hash key for a memory entry
pub fn memory_key(content: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    format!("memory/{:x}", hasher.finish())
}

/// Persist a note for later runs
pub struct RememberTool;

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &'static str {
        "remember"
    }

    fn description(&self) -> &'static str {
        "Persist a note to long-term memory, keyed by its content hash."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text to remember" },
                "tags": { "type": "array", "description": "Optional tags" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(run_id = %ctx.run_id, "RememberTool::execute: called");
        let Some(content) = input["content"].as_str() else {
            return ToolResult::error("content is required");
        };
        let Some(state) = ctx.state() else {
            return ToolResult::error("memory store not available in this context");
        };

        let key = memory_key(content);
        let metadata = serde_json::json!({
            "run_id": ctx.run_id,
            "tags": input["tags"].as_array().cloned().unwrap_or_default(),
        });

        match state.put_item(&key, &Value::String(content.to_string()), &metadata).await {
            Ok(()) => ToolResult::success(format!("Remembered under {key}")),
            Err(e) => ToolResult::error(format!("Failed to persist memory: {e}")),
        }
    }
}

/// Query memory entries by substring
pub struct RecallTool;

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &'static str {
        "recall"
    }

    fn description(&self) -> &'static str {
        "Search long-term memory for entries containing the query."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Substring to look for" },
                "max_results": { "type": "integer", "description": "Cap on entries (default 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(run_id = %ctx.run_id, "RecallTool::execute: called");
        let Some(query) = input["query"].as_str() else {
            return ToolResult::error("query is required");
        };
        let Some(state) = ctx.state() else {
            return ToolResult::error("memory store not available in this context");
        };
        let max_results = input["max_results"].as_u64().unwrap_or(10) as usize;

        let items = match state.list_items("memory/").await {
            Ok(items) => items,
            Err(e) => return ToolResult::error(format!("Failed to query memory: {e}")),
        };

        let needle = query.to_lowercase();
        let hits: Vec<String> = items
            .iter()
            .filter_map(|item| item.value.as_str().map(str::to_string))
            .filter(|text| text.to_lowercase().contains(&needle))
            .take(max_results)
            .collect();

        if hits.is_empty() {
            ToolResult::success("No memories matched")
        } else {
            ToolResult::success(hits.join("\n---\n"))
        }
    }
}
