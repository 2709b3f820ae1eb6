//! Memory primitive - append/query over the content-hash keyed store

use serde_json::Value;
use tracing::debug;

use crate::tools::builtin::memory_key;

use super::{PrimitiveContext, PrimitiveError};

/// Input: `{"op": "append", "content": "..."}` or
/// `{"op": "query", "query": "...", "max_results"?: n}`
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    debug!(run_id = %ctx.run_id, "memory::run: called");
    match input["op"].as_str() {
        Some("append") => {
            let Some(content) = input["content"].as_str() else {
                return Err(PrimitiveError::Validation("content is required".to_string()));
            };

            let key = memory_key(content);
            let metadata = serde_json::json!({ "run_id": ctx.run_id });
            ctx.state
                .put_item(&key, &Value::String(content.to_string()), &metadata)
                .await?;
            Ok(serde_json::json!({ "key": key }))
        }
        Some("query") => {
            let Some(query) = input["query"].as_str() else {
                return Err(PrimitiveError::Validation("query is required".to_string()));
            };
            let max_results = input["max_results"].as_u64().unwrap_or(10) as usize;

            let needle = query.to_lowercase();
            let items = ctx.state.list_items("memory/").await?;
            let hits: Vec<Value> = items
                .into_iter()
                .filter(|item| {
                    item.value
                        .as_str()
                        .map(|text| text.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .take(max_results)
                .map(|item| serde_json::json!({ "key": item.key, "content": item.value }))
                .collect();

            Ok(serde_json::json!({ "hits": hits }))
        }
        _ => Err(PrimitiveError::Validation(
            "op must be 'append' or 'query'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests_support::context_with_responses;

    #[tokio::test]
    async fn test_append_and_query() {
        let (ctx, _temp) = context_with_responses(vec![]).await;

        let stored = run(
            &ctx,
            serde_json::json!({"op": "append", "content": "migration uses sqlite WAL"}),
        )
        .await
        .unwrap();
        assert!(stored["key"].as_str().unwrap().starts_with("memory/"));

        let found = run(&ctx, serde_json::json!({"op": "query", "query": "sqlite"})).await.unwrap();
        assert_eq!(found["hits"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_is_idempotent_per_content() {
        let (ctx, _temp) = context_with_responses(vec![]).await;

        let first = run(&ctx, serde_json::json!({"op": "append", "content": "same note"})).await.unwrap();
        let second = run(&ctx, serde_json::json!({"op": "append", "content": "same note"})).await.unwrap();
        assert_eq!(first["key"], second["key"]);

        let found = run(&ctx, serde_json::json!({"op": "query", "query": "same note"})).await.unwrap();
        assert_eq!(found["hits"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_op() {
        let (ctx, _temp) = context_with_responses(vec![]).await;
        assert!(run(&ctx, serde_json::json!({"op": "delete"})).await.is_err());
    }
}
