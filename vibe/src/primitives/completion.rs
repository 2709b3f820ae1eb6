//! Completion primitive - a stable thin wrapper over the router

use serde_json::Value;
use tracing::debug;

use crate::llm::ChatRequest;

use super::{PrimitiveContext, PrimitiveError};

/// Input: `{"prompt": "...", "system"?: "...", "model"?: "...",
/// "max_tokens"?: n, "temperature"?: t}`
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    debug!(run_id = %ctx.run_id, "completion::run: called");
    let Some(prompt) = input["prompt"].as_str() else {
        return Err(PrimitiveError::Validation("prompt is required".to_string()));
    };

    let mut request = ChatRequest::prompt(
        input["system"].as_str().unwrap_or("You are a helpful assistant."),
        prompt,
        input["max_tokens"].as_u64().map(|m| m as u32).unwrap_or(ctx.max_tokens),
    );
    request.model = input["model"].as_str().map(str::to_string);
    request.temperature = input["temperature"].as_f64().map(|t| t as f32);

    let response = ctx.router.chat(request).await?;

    Ok(serde_json::json!({
        "text": response.text(),
        "model": response.model,
        "provider": response.provider,
        "usage": {
            "input_tokens": response.usage.input_tokens,
            "output_tokens": response.usage.output_tokens,
        },
        "cost_usd": response.cost_usd,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests_support::context_with_responses;

    #[tokio::test]
    async fn test_completion_returns_text_and_usage() {
        let (ctx, _temp) = context_with_responses(vec!["the answer"]).await;

        let output = run(&ctx, serde_json::json!({"prompt": "question?"})).await.unwrap();
        assert_eq!(output["text"], "the answer");
        assert_eq!(output["provider"], "mock");
        assert!(output["usage"]["input_tokens"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_completion_requires_prompt() {
        let (ctx, _temp) = context_with_responses(vec![]).await;

        let err = run(&ctx, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::Validation(_)));
    }
}
