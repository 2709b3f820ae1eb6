//! search tool - term search scored by query coverage

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use contextkit::{IGNORED_DIRS, SOURCE_EXTENSIONS};

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

/// One scored search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub path: String,
    pub line_number: usize,
    pub line: String,
    pub score: f64,
}

/// Substring search over paths and file contents. Score is the fraction of
/// query terms the line (or path) matches.
pub struct SearchTool;

impl SearchTool {
    /// Core search shared with the Search primitive
    pub fn search(workspace: &std::path::Path, query: &str, max_results: usize) -> Vec<SearchHit> {
        let terms: Vec<String> = query.to_lowercase().split_whitespace().map(str::to_string).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = Vec::new();

        for entry in WalkDir::new(workspace)
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
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let is_source = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
                .unwrap_or(false);
            if !is_source {
                continue;
            }

            let display = path.strip_prefix(workspace).unwrap_or(path).to_string_lossy().to_string();

            // Path-level hit
            let path_lower = display.to_lowercase();
            let path_matched = terms.iter().filter(|t| path_lower.contains(*t)).count();
            if path_matched > 0 {
                hits.push(SearchHit {
                    path: display.clone(),
                    line_number: 0,
                    line: String::new(),
                    score: path_matched as f64 / terms.len() as f64,
                });
            }

            // Content-level hits
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            for (n, line) in content.lines().enumerate() {
                let lower = line.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(*t)).count();
                if matched > 0 {
                    hits.push(SearchHit {
                        path: display.clone(),
                        line_number: n + 1,
                        line: line.trim().to_string(),
                        score: matched as f64 / terms.len() as f64,
                    });
                }
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(max_results);
        hits
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search file paths and contents for query terms, ranked by how many terms match."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Project
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Space-separated search terms" },
                "max_results": { "type": "integer", "description": "Cap on hits (default 25)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SearchTool::execute: called");
        let Some(query) = input["query"].as_str() else {
            return ToolResult::error("query is required");
        };
        let max_results = input["max_results"].as_u64().unwrap_or(25) as usize;

        let hits = Self::search(&ctx.workspace, query, max_results);
        if hits.is_empty() {
            return ToolResult::success("No results");
        }

        let lines: Vec<String> = hits
            .iter()
            .map(|h| {
                if h.line_number == 0 {
                    format!("{:.2} {}", h.score, h.path)
                } else {
                    format!("{:.2} {}:{}: {}", h.score, h.path, h.line_number, h.line)
                }
            })
            .collect();
        ToolResult::success(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_search_scores_by_term_coverage() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "fn login_user() {}\nfn logout() {}\n").unwrap();

        let hits = SearchTool::search(temp.path(), "login user", 10);
        assert!(!hits.is_empty());
        // "fn login_user() {}" matches both terms
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert_eq!(hits[0].line_number, 1);
    }

    #[tokio::test]
    async fn test_search_path_hits() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("auth")).unwrap();
        std::fs::write(temp.path().join("auth/mod.rs"), "pub struct Session;\n").unwrap();

        let hits = SearchTool::search(temp.path(), "auth", 10);
        assert!(hits.iter().any(|h| h.line_number == 0 && h.path.contains("auth")));
    }

    #[tokio::test]
    async fn test_search_tool_empty_query_is_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = SearchTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.success);
    }
}
