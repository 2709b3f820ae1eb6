//! OpenAI chat-completions client
//!
//! Implements the Provider trait for the OpenAI Chat Completions wire format.
//! The same adapter, constructed with `compat`, serves any OpenAI-compatible
//! endpoint (configurable base URL, optional key).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageContent, Provider, ProviderError, ProviderSettings,
    StopReason, StreamChunk, TokenUsage, ToolCall,
};

/// OpenAI (and OpenAI-compatible) API client
pub struct OpenAiProvider {
    settings: ProviderSettings,
    http: Client,
}

impl OpenAiProvider {
    /// Create a client that requires an API key
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        debug!(provider = %settings.id, model = %settings.default_model, "OpenAiProvider::new: called");
        if settings.api_key.is_none() {
            return Err(ProviderError::Authentication(format!(
                "API key for '{}' not set",
                settings.id
            )));
        }
        Self::build(settings)
    }

    /// Create a client for a generic OpenAI-compatible endpoint; the key is
    /// optional here.
    pub fn compat(settings: ProviderSettings) -> Result<Self, ProviderError> {
        debug!(provider = %settings.id, base_url = %settings.base_url, "OpenAiProvider::compat: called");
        Self::build(settings)
    }

    fn build(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { settings, http })
    }

    fn model_for(&self, request: &ChatRequest) -> String {
        request.model.clone().unwrap_or_else(|| self.settings.default_model.clone())
    }

    fn request_builder(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(url).header("content-type", "application/json");
        if let Some(key) = &self.settings.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    /// Build the request body for the chat-completions API
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(convert_messages(&request.messages));

        let mut body = serde_json::json!({
            "model": self.model_for(request),
            "messages": messages,
            "max_tokens": request.max_tokens,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        if !request.tools.is_empty() {
            body["tools"] =
                serde_json::json!(request.tools.iter().map(|t| t.to_openai_schema()).collect::<Vec<_>>());
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }

    /// Parse the chat-completions response
    fn parse_response(&self, model: String, api_response: OpenAiResponse) -> ChatResponse {
        let choice = api_response.choices.into_iter().next();

        let (content, tool_calls, stop_reason) = match choice {
            Some(c) => {
                let tool_calls = c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
                    })
                    .collect();
                let stop_reason = c
                    .finish_reason
                    .as_deref()
                    .map(StopReason::from_finish_reason)
                    .unwrap_or(StopReason::EndTurn);
                (c.message.content, tool_calls, stop_reason)
            }
            None => (None, vec![], StopReason::EndTurn),
        };

        ChatResponse {
            content,
            tool_calls,
            stop_reason,
            usage: TokenUsage {
                input_tokens: api_response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                output_tokens: api_response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            },
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        }
    }
}

/// Convert canonical messages to the chat-completions format.
///
/// The wire requires one message per tool result, so a single canonical
/// message with several tool results fans out.
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut result = Vec::new();

    for msg in messages {
        let role = match msg.role {
            super::Role::User => "user",
            super::Role::Assistant => "assistant",
        };

        match &msg.content {
            MessageContent::Text(text) => {
                result.push(serde_json::json!({ "role": role, "content": text }));
            }
            MessageContent::Blocks(blocks) => {
                let mut tool_calls = Vec::new();
                let mut tool_results = Vec::new();
                let mut text_content = String::new();

                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => text_content.push_str(text),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(serde_json::json!({
                                "id": id,
                                "type": "function",
                                "function": { "name": name, "arguments": input.to_string() }
                            }));
                        }
                        ContentBlock::ToolResult {
                            tool_use_id, content, ..
                        } => tool_results.push((tool_use_id.clone(), content.clone())),
                    }
                }

                if !tool_results.is_empty() {
                    for (tool_call_id, content) in tool_results {
                        result.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": tool_call_id,
                            "content": content,
                        }));
                    }
                    continue;
                }

                if !tool_calls.is_empty() {
                    let mut msg = serde_json::json!({ "role": "assistant", "tool_calls": tool_calls });
                    if !text_content.is_empty() {
                        msg["content"] = serde_json::json!(text_content);
                    }
                    result.push(msg);
                    continue;
                }

                result.push(serde_json::json!({ "role": role, "content": text_content }));
            }
        }
    }

    result
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.settings.id
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, max_tokens = request.max_tokens, "complete: called");
        let url = format!("{}/v1/chat/completions", self.settings.base_url);
        let body = self.build_request_body(&request);

        let response = self.request_builder(&url).json(&body).send().await?;
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

        let api_response: OpenAiResponse = response.json().await?;
        Ok(self.parse_response(model, api_response))
    }

    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, "stream: called");
        let url = format!("{}/v1/chat/completions", self.settings.base_url);
        let mut body = self.build_request_body(&request);
        body["stream"] = serde_json::json!(true);
        body["stream_options"] = serde_json::json!({ "include_usage": true });

        let response = self.request_builder(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let mut stream = response.bytes_stream();
        let mut full_content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut current_tool_calls: std::collections::HashMap<usize, (String, String, String)> =
            std::collections::HashMap::new(); // index -> (id, name, args)
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();
        let mut buffer = String::new();
        let mut finished = false;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(ProviderError::Network)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete SSE lines
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() {
                    continue;
                }
                if line == "data: [DONE]" {
                    finished = true;
                    continue;
                }

                if let Some(data) = line.strip_prefix("data: ")
                    && let Ok(chunk_data) = serde_json::from_str::<OpenAiStreamChunk>(data)
                {
                    if let Some(choice) = chunk_data.choices.first() {
                        if let Some(content) = &choice.delta.content {
                            full_content.push_str(content);
                            let _ = chunk_tx.send(StreamChunk::TextDelta(content.clone())).await;
                        }

                        if let Some(tcs) = &choice.delta.tool_calls {
                            for tc in tcs {
                                let entry = current_tool_calls
                                    .entry(tc.index)
                                    .or_insert_with(|| (String::new(), String::new(), String::new()));

                                if let Some(id) = &tc.id {
                                    entry.0 = id.clone();
                                }
                                if let Some(func) = &tc.function {
                                    if let Some(name) = &func.name {
                                        entry.1 = name.clone();
                                        let _ = chunk_tx
                                            .send(StreamChunk::ToolUseStart {
                                                id: entry.0.clone(),
                                                name: name.clone(),
                                            })
                                            .await;
                                    }
                                    if let Some(args) = &func.arguments {
                                        entry.2.push_str(args);
                                        let _ = chunk_tx
                                            .send(StreamChunk::ToolUseDelta {
                                                id: entry.0.clone(),
                                                json_delta: args.clone(),
                                            })
                                            .await;
                                    }
                                }
                            }
                        }

                        if let Some(reason) = &choice.finish_reason {
                            stop_reason = StopReason::from_finish_reason(reason);
                        }
                    }

                    if let Some(u) = chunk_data.usage {
                        usage.input_tokens = u.prompt_tokens;
                        usage.output_tokens = u.completion_tokens;
                    }
                }
            }
        }

        if !finished {
            debug!("stream: transport ended before [DONE]");
            return Err(ProviderError::StreamTruncated);
        }

        // Finalize tool calls
        for (_, (id, name, args)) in current_tool_calls {
            let input = serde_json::from_str(&args).unwrap_or(serde_json::json!({}));
            tool_calls.push(ToolCall {
                id: id.clone(),
                name,
                input,
            });
            let _ = chunk_tx.send(StreamChunk::ToolUseEnd { id }).await;
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

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// Streaming types

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            id: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key: Some("test-key".to_string()),
            default_model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_requires_api_key_unless_compat() {
        let mut s = settings();
        s.api_key = None;
        assert!(OpenAiProvider::new(s.clone()).is_err());
        assert!(OpenAiProvider::compat(s).is_ok());
    }

    #[test]
    fn test_build_request_body_basic() {
        let provider = OpenAiProvider::new(settings()).unwrap();
        let request = ChatRequest::prompt("You are helpful", "Hello", 1000);

        let body = provider.build_request_body(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tool_results_fan_out() {
        let messages = vec![Message::user_blocks(vec![
            ContentBlock::tool_result("call_1", "out 1", false),
            ContentBlock::tool_result("call_2", "out 2", true),
        ])];

        let wire = convert_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "call_1");
        assert_eq!(wire[1]["tool_call_id"], "call_2");
    }

    #[test]
    fn test_parse_response_tool_calls() {
        let provider = OpenAiProvider::new(settings()).unwrap();
        let api_response: OpenAiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "list_directory", "arguments": "{\"path\": \"src\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3}
        }))
        .unwrap();

        let response = provider.parse_response("gpt-4o".to_string(), api_response);
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls[0].name, "list_directory");
        assert_eq!(response.tool_calls[0].input["path"], "src");
        assert_eq!(response.usage.input_tokens, 9);
    }
}
