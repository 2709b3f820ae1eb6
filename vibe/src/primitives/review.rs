//! Review primitive - verify and explain an execution

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::llm::ChatRequest;

use super::{PrimitiveContext, PrimitiveError, planner::extract_json_object};

/// Input: `{"task": "...", "results": [...]}` where results are the step
/// outcome blobs. Output: `{"verified": bool, "explanation": "..."}`.
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    debug!(run_id = %ctx.run_id, "review::run: called");
    let Some(task) = input["task"].as_str() else {
        return Err(PrimitiveError::Validation("task is required".to_string()));
    };

    let results_text = match &input["results"] {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(n, item)| format!("step {}: {}", n + 1, truncate(&item.to_string(), 500)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::String(s) => s.clone(),
        _ => return Err(PrimitiveError::Validation("results are required".to_string())),
    };

    let mut values: BTreeMap<&str, String> = BTreeMap::new();
    values.insert("task", task.to_string());
    values.insert("results", results_text);

    let prompt = ctx
        .prompts
        .render("review", &values)
        .map_err(|e| PrimitiveError::Validation(e.to_string()))?;

    let response = ctx.router.chat(ChatRequest::prompt(prompt, task, ctx.max_tokens)).await?;
    let text = response.text();

    // Prefer the structured reply; fall back to a lenient text scan
    if let Some(json) = extract_json_object(text)
        && let Ok(parsed) = serde_json::from_str::<Value>(json)
        && parsed.get("verified").is_some()
    {
        return Ok(serde_json::json!({
            "verified": parsed["verified"].as_bool().unwrap_or(false),
            "explanation": parsed["explanation"].as_str().unwrap_or(text),
        }));
    }

    let lower = text.to_lowercase();
    let verified = lower.contains("verified") && !lower.contains("not verified");
    Ok(serde_json::json!({ "verified": verified, "explanation": text }))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() > max {
        format!("{}...", &text[..max])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests_support::context_with_responses;

    #[tokio::test]
    async fn test_structured_verdict() {
        let (ctx, _temp) =
            context_with_responses(vec![r#"{"verified": true, "explanation": "all steps succeeded"}"#]).await;

        let output = run(
            &ctx,
            serde_json::json!({"task": "list files", "results": [{"success": true}]}),
        )
        .await
        .unwrap();

        assert_eq!(output["verified"], true);
        assert_eq!(output["explanation"], "all steps succeeded");
    }

    #[tokio::test]
    async fn test_lenient_fallback() {
        let (ctx, _temp) = context_with_responses(vec!["The outcome is verified and correct."]).await;

        let output = run(&ctx, serde_json::json!({"task": "t", "results": "raw text"})).await.unwrap();
        assert_eq!(output["verified"], true);
    }

    #[tokio::test]
    async fn test_requires_results() {
        let (ctx, _temp) = context_with_responses(vec![]).await;
        assert!(run(&ctx, serde_json::json!({"task": "t"})).await.is_err());
    }
}
