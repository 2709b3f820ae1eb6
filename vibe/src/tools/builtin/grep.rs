//! grep tool - regex search over workspace files

use async_trait::async_trait;
use grep_regex::RegexMatcherBuilder;
use grep_searcher::SearcherBuilder;
use grep_searcher::sinks::UTF8;
use serde_json::Value;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use contextkit::{IGNORED_DIRS, SOURCE_EXTENSIONS};

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

/// Regex search across source files
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search source files for a regex pattern. Returns path:line:content matches."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regex pattern" },
                "path": { "type": "string", "description": "Subdirectory to search (default workspace root)" },
                "case_insensitive": { "type": "boolean", "description": "Case-insensitive search" },
                "max_results": { "type": "integer", "description": "Cap on matches (default 50)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "GrepTool::execute: called");
        let Some(pattern) = input["pattern"].as_str() else {
            return ToolResult::error("pattern is required");
        };
        let sub_path = input["path"].as_str().unwrap_or(".");
        let case_insensitive = input["case_insensitive"].as_bool().unwrap_or(false);
        let max_results = input["max_results"].as_u64().unwrap_or(50) as usize;

        let root = match ctx.validate_path(Path::new(sub_path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let matcher = match RegexMatcherBuilder::new().case_insensitive(case_insensitive).build(pattern) {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("Invalid pattern: {e}")),
        };

        let mut searcher = SearcherBuilder::new().line_number(true).build();
        let mut matches: Vec<String> = Vec::new();

        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| !IGNORED_DIRS.contains(&name))
                    .unwrap_or(true)
            })
            .filter_map(|e| e.ok())
        {
            if matches.len() >= max_results {
                break;
            }
            let path = entry.path();
            if !entry.file_type().is_file() || !has_source_extension(path) {
                continue;
            }

            let display = path.strip_prefix(&ctx.workspace).unwrap_or(path).to_path_buf();
            let result = searcher.search_path(
                &matcher,
                path,
                UTF8(|line_number, line| {
                    matches.push(format!("{}:{}:{}", display.display(), line_number, line.trim_end()));
                    Ok(matches.len() < max_results)
                }),
            );
            if let Err(e) = result {
                debug!(path = %path.display(), error = %e, "GrepTool::execute: skipping unreadable file");
            }
        }

        if matches.is_empty() {
            ToolResult::success("No matches")
        } else {
            ToolResult::success(matches.join("\n"))
        }
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext) || matches!(ext, "md" | "toml" | "json" | "yml" | "yaml" | "txt"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_grep_finds_matches() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = GrepTool.execute(serde_json::json!({"pattern": "fn alpha"}), &ctx).await;

        assert!(result.success);
        assert!(result.output.contains("src/a.rs:1:fn alpha() {}"));
    }

    #[tokio::test]
    async fn test_grep_case_insensitive() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "const VALUE: u32 = 1;\n").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let strict = GrepTool.execute(serde_json::json!({"pattern": "value"}), &ctx).await;
        assert_eq!(strict.output, "No matches");

        let relaxed = GrepTool
            .execute(serde_json::json!({"pattern": "value", "case_insensitive": true}), &ctx)
            .await;
        assert!(relaxed.output.contains("VALUE"));
    }

    #[tokio::test]
    async fn test_grep_respects_max_results() {
        let temp = tempdir().unwrap();
        let body: String = (0..20).map(|i| format!("needle {i}\n")).collect();
        std::fs::write(temp.path().join("a.rs"), body).unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = GrepTool
            .execute(serde_json::json!({"pattern": "needle", "max_results": 5}), &ctx)
            .await;

        assert_eq!(result.output.lines().count(), 5);
    }
}
