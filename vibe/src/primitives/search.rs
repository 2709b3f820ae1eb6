//! Search primitive - scored path/content search over the workspace

use serde_json::Value;
use tracing::debug;

use crate::tools::builtin::SearchTool;

use super::{PrimitiveContext, PrimitiveError};

/// Input: `{"query": "...", "max_results"?: n}`.
/// Output: hits ordered by score = matched terms / total terms.
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    debug!(run_id = %ctx.run_id, "search::run: called");
    let Some(query) = input["query"].as_str() else {
        return Err(PrimitiveError::Validation("query is required".to_string()));
    };
    let max_results = input["max_results"].as_u64().unwrap_or(25) as usize;

    let workspace = ctx.workspace.clone();
    let query = query.to_string();
    let hits = tokio::task::spawn_blocking(move || SearchTool::search(&workspace, &query, max_results))
        .await
        .map_err(|e| PrimitiveError::Tool(e.to_string()))?;

    let count = hits.len();
    Ok(serde_json::json!({
        "hits": hits,
        "count": count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests_support::context_with_responses;

    #[tokio::test]
    async fn test_search_finds_and_scores() {
        let (ctx, temp) = context_with_responses(vec![]).await;
        std::fs::write(temp.path().join("auth.rs"), "fn check_token(token: &str) {}\n").unwrap();
        std::fs::write(temp.path().join("draw.rs"), "fn render() {}\n").unwrap();

        let output = run(&ctx, serde_json::json!({"query": "token"})).await.unwrap();
        assert!(output["count"].as_u64().unwrap() >= 1);
        let first = &output["hits"][0];
        assert!(first["path"].as_str().unwrap().contains("auth.rs"));
        assert!(first["score"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (ctx, _temp) = context_with_responses(vec![]).await;
        assert!(run(&ctx, serde_json::json!({})).await.is_err());
    }
}
