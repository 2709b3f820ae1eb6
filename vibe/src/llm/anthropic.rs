//! Anthropic Claude API client
//!
//! Implements the Provider trait for Anthropic's Messages API with support
//! for both blocking and SSE streaming responses.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageContent, Provider, ProviderError, ProviderSettings,
    StopReason, StreamChunk, TokenUsage, ToolCall,
};

/// Anthropic Claude API client
pub struct AnthropicProvider {
    settings: ProviderSettings,
    http: Client,
}

impl AnthropicProvider {
    /// Create a client from resolved settings
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        debug!(provider = %settings.id, model = %settings.default_model, "AnthropicProvider::new: called");
        if settings.api_key.is_none() {
            return Err(ProviderError::Authentication(format!(
                "API key for '{}' not set",
                settings.id
            )));
        }

        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self { settings, http })
    }

    fn api_key(&self) -> &str {
        self.settings.api_key.as_deref().unwrap_or_default()
    }

    fn model_for(&self, request: &ChatRequest) -> String {
        request.model.clone().unwrap_or_else(|| self.settings.default_model.clone())
    }

    /// Build the request body for the Anthropic API
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model_for(request),
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": convert_messages(&request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(
                request
                    .tools
                    .iter()
                    .map(|t| t.to_anthropic_schema())
                    .collect::<Vec<_>>()
            );
        }

        body
    }

    /// Parse the Anthropic API response
    fn parse_response(&self, model: String, api_response: AnthropicResponse) -> ChatResponse {
        let mut content = None;
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                AnthropicContentBlock::Text { text } => {
                    content = Some(text);
                }
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input });
                }
            }
        }

        ChatResponse {
            content,
            tool_calls,
            stop_reason: StopReason::from_anthropic(&api_response.stop_reason),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        }
    }
}

/// Convert canonical messages to Anthropic wire format
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                super::Role::User => "user",
                super::Role::Assistant => "assistant",
            };
            let content = match &msg.content {
                MessageContent::Text(text) => serde_json::json!(text),
                MessageContent::Blocks(blocks) => {
                    serde_json::json!(blocks.iter().map(convert_block).collect::<Vec<_>>())
                }
            };
            serde_json::json!({ "role": role, "content": content })
        })
        .collect()
}

fn convert_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({ "type": "text", "text": text }),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.settings.id
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, max_tokens = request.max_tokens, "complete: called");
        let url = format!("{}/v1/messages", self.settings.base_url);
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let api_response: AnthropicResponse = response.json().await?;
        Ok(self.parse_response(model, api_response))
    }

    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, "stream: called");
        let url = format!("{}/v1/messages", self.settings.base_url);
        let mut body = self.build_request_body(&request);
        body["stream"] = serde_json::json!(true);

        let http_request = self
            .http
            .post(url)
            .header("x-api-key", self.api_key())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let mut full_content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut current_tool: Option<(String, String, String)> = None; // (id, name, json_acc)
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();
        let mut finished = false;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Message(msg)) => {
                    let data: serde_json::Value = serde_json::from_str(&msg.data).map_err(ProviderError::Json)?;

                    match data["type"].as_str() {
                        Some("content_block_start") => {
                            if let Some(block) = data.get("content_block")
                                && block["type"] == "tool_use"
                            {
                                let id = block["id"].as_str().unwrap_or("").to_string();
                                let name = block["name"].as_str().unwrap_or("").to_string();
                                current_tool = Some((id.clone(), name.clone(), String::new()));
                                let _ = chunk_tx.send(StreamChunk::ToolUseStart { id, name }).await;
                            }
                        }
                        Some("content_block_delta") => {
                            if let Some(delta) = data.get("delta") {
                                if let Some(text) = delta["text"].as_str() {
                                    full_content.push_str(text);
                                    let _ = chunk_tx.send(StreamChunk::TextDelta(text.to_string())).await;
                                }
                                if let Some(json) = delta["partial_json"].as_str()
                                    && let Some((ref id, _, ref mut acc)) = current_tool
                                {
                                    acc.push_str(json);
                                    let _ = chunk_tx
                                        .send(StreamChunk::ToolUseDelta {
                                            id: id.clone(),
                                            json_delta: json.to_string(),
                                        })
                                        .await;
                                }
                            }
                        }
                        Some("content_block_stop") => {
                            if let Some((id, name, json)) = current_tool.take() {
                                let input: serde_json::Value =
                                    serde_json::from_str(&json).unwrap_or(serde_json::json!({}));
                                tool_calls.push(ToolCall {
                                    id: id.clone(),
                                    name,
                                    input,
                                });
                                let _ = chunk_tx.send(StreamChunk::ToolUseEnd { id }).await;
                            }
                        }
                        Some("message_delta") => {
                            if let Some(sr) = data["delta"]["stop_reason"].as_str() {
                                stop_reason = StopReason::from_anthropic(sr);
                            }
                            if let Some(u) = data.get("usage") {
                                usage.output_tokens = u["output_tokens"].as_u64().unwrap_or(0);
                            }
                        }
                        Some("message_start") => {
                            if let Some(u) = data["message"].get("usage") {
                                usage.input_tokens = u["input_tokens"].as_u64().unwrap_or(0);
                            }
                        }
                        Some("message_stop") => {
                            finished = true;
                            break;
                        }
                        _ => {}
                    }
                }
                Ok(Event::Open) => {}
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    let _ = chunk_tx.send(StreamChunk::Error(e.to_string())).await;
                    return Err(ProviderError::InvalidResponse(e.to_string()));
                }
            }
        }

        if !finished {
            debug!("stream: transport ended before message_stop");
            return Err(ProviderError::StreamTruncated);
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone { stop_reason, usage })
            .await;

        Ok(ChatResponse {
            content: if full_content.is_empty() { None } else { Some(full_content) },
            tool_calls,
            stop_reason,
            usage,
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        })
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            id: "anthropic".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: Some("test-key".to_string()),
            default_model: "claude-sonnet-4-20250514".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_requires_api_key() {
        let mut s = settings();
        s.api_key = None;
        assert!(matches!(
            AnthropicProvider::new(s),
            Err(ProviderError::Authentication(_))
        ));
    }

    #[test]
    fn test_build_request_body() {
        let provider = AnthropicProvider::new(settings()).unwrap();
        let request = ChatRequest::prompt("You are helpful", "Hello", 1000);

        let body = provider.build_request_body(&request);

        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "You are helpful");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_model_override_wins() {
        let provider = AnthropicProvider::new(settings()).unwrap();
        let mut request = ChatRequest::prompt("s", "u", 10);
        request.model = Some("claude-opus-4-20250514".to_string());

        let body = provider.build_request_body(&request);
        assert_eq!(body["model"], "claude-opus-4-20250514");
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let provider = AnthropicProvider::new(settings()).unwrap();
        let api_response: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Let me check"},
                {"type": "tool_use", "id": "tu_1", "name": "read_file", "input": {"path": "a.rs"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        }))
        .unwrap();

        let response = provider.parse_response("m".to_string(), api_response);
        assert_eq!(response.content.as_deref(), Some("Let me check"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "read_file");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.input_tokens, 12);
    }

    #[test]
    fn test_tool_result_block_wire_shape() {
        let block = convert_block(&ContentBlock::tool_result("tu_1", "ok", false));
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "tu_1");
        assert_eq!(block["is_error"], false);
    }
}
