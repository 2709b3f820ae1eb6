//! Agentic tool loop
//!
//! Drives one LLM conversation that may request tool calls: completion →
//! tool_use → execute tools → feed results back, until the model ends its
//! turn or the turn budget runs out.

use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{ChatRequest, ChatResponse, ContentBlock, Message, StopReason, TokenUsage, ToolDefinition};
use crate::tools::ToolResult;

use super::{PrimitiveContext, PrimitiveError, determinism};

/// Result of one agentic conversation
#[derive(Debug)]
pub struct AgenticOutcome {
    /// Final assistant text, if any
    pub text: Option<String>,

    /// Total turns consumed
    pub turns: u32,

    /// Accumulated token usage across all turns
    pub usage: TokenUsage,

    /// (tool, success) pairs in execution order
    pub tool_calls: Vec<(String, bool)>,
}

/// Run the tool loop for one prompt. `max_turns` bounds the number of LLM
/// round-trips.
pub async fn run_agentic_loop(
    ctx: &PrimitiveContext,
    system_prompt: &str,
    initial_prompt: &str,
    tool_defs: Vec<ToolDefinition>,
    max_turns: u32,
) -> Result<AgenticOutcome, PrimitiveError> {
    debug!(run_id = %ctx.run_id, tools = tool_defs.len(), max_turns, "run_agentic_loop: called");

    let mut messages = vec![Message::user(initial_prompt)];
    let mut usage = TokenUsage::default();
    let mut tool_calls: Vec<(String, bool)> = Vec::new();
    let mut final_text: Option<String> = None;
    let mut turn = 0u32;

    loop {
        turn += 1;
        if turn > max_turns {
            warn!(run_id = %ctx.run_id, max_turns, "run_agentic_loop: turn budget exhausted");
            break;
        }

        let request = ChatRequest {
            system_prompt: system_prompt.to_string(),
            messages: messages.clone(),
            tools: tool_defs.clone(),
            max_tokens: ctx.max_tokens,
            temperature: None,
            model: None,
        };

        let response = ctx.router.chat(request).await?;
        usage.add(&response.usage);

        if let Some(text) = &response.content {
            final_text = Some(text.clone());
        }

        messages.push(build_assistant_message(&response));

        match response.stop_reason {
            StopReason::EndTurn | StopReason::StopSequence => {
                debug!(run_id = %ctx.run_id, turn, "run_agentic_loop: model ended turn");
                break;
            }
            StopReason::ToolUse => {
                debug!(run_id = %ctx.run_id, turn, calls = response.tool_calls.len(), "run_agentic_loop: executing tools");
                let mut blocks = Vec::with_capacity(response.tool_calls.len());

                for call in &response.tool_calls {
                    let output = determinism::call_tool(ctx, &call.name, call.input.clone()).await?;
                    let result = tool_result_from(&output);
                    tool_calls.push((call.name.clone(), result.success));

                    let content = if result.success {
                        result.output
                    } else {
                        result.error.unwrap_or_else(|| "tool failed".to_string())
                    };
                    blocks.push(ContentBlock::tool_result(&call.id, content, !result.success));
                }

                messages.push(Message::user_blocks(blocks));
            }
            StopReason::MaxTokens => {
                debug!(run_id = %ctx.run_id, turn, "run_agentic_loop: truncated, asking to continue");
                messages.push(Message::user(
                    "Continue from where you left off. Your previous response was truncated.",
                ));
            }
        }
    }

    Ok(AgenticOutcome {
        text: final_text,
        turns: turn.min(max_turns),
        usage,
        tool_calls,
    })
}

fn build_assistant_message(response: &ChatResponse) -> Message {
    let mut blocks = Vec::new();
    if let Some(text) = &response.content {
        blocks.push(ContentBlock::text(text));
    }
    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }
    Message::assistant_blocks(blocks)
}

fn tool_result_from(output: &Value) -> ToolResult {
    serde_json::from_value(output.clone()).unwrap_or_else(|_| ToolResult::error("unreadable tool output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockOutcome, response_with};
    use crate::llm::ToolCall;
    use crate::primitives::tests_support::{context_with_outcomes, context_with_responses};

    fn tool_use_response(tool: &str, input: Value) -> crate::llm::ChatResponse {
        let mut response = response_with("mock", "using a tool");
        response.stop_reason = StopReason::ToolUse;
        response.tool_calls = vec![ToolCall {
            id: "call_1".to_string(),
            name: tool.to_string(),
            input,
        }];
        response
    }

    #[tokio::test]
    async fn test_plain_completion_ends_after_one_turn() {
        let (ctx, _temp) = context_with_responses(vec!["done immediately"]).await;

        let outcome = run_agentic_loop(&ctx, "system", "do the thing", vec![], 10).await.unwrap();
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.text.as_deref(), Some("done immediately"));
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_use_then_completion() {
        let (ctx, temp) = context_with_outcomes(vec![
            MockOutcome::Ok(tool_use_response(
                "list_directory",
                serde_json::json!({"path": "."}),
            )),
            MockOutcome::Ok(response_with("mock", "I saw the files")),
        ])
        .await;
        std::fs::write(temp.path().join("seen.txt"), "x").unwrap();

        let defs = ctx.tools.definitions();
        let outcome = run_agentic_loop(&ctx, "system", "look around", defs, 10).await.unwrap();

        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.text.as_deref(), Some("I saw the files"));
        assert_eq!(outcome.tool_calls, vec![("list_directory".to_string(), true)]);
        assert!(outcome.usage.total() > 0);
    }

    #[tokio::test]
    async fn test_turn_budget_bounds_loop() {
        // The mock repeats its last outcome, so the model would call tools forever
        let (ctx, _temp) = context_with_outcomes(vec![MockOutcome::Ok(tool_use_response(
            "list_directory",
            serde_json::json!({"path": "."}),
        ))])
        .await;

        let defs = ctx.tools.definitions();
        let outcome = run_agentic_loop(&ctx, "system", "loop forever", defs, 3).await.unwrap();
        assert_eq!(outcome.turns, 3);
    }
}
