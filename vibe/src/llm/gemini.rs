//! Google Gemini generative-content client

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

/// Google Gemini API client
pub struct GeminiProvider {
    settings: ProviderSettings,
    http: Client,
}

impl GeminiProvider {
    /// Create a client from resolved settings
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        debug!(provider = %settings.id, model = %settings.default_model, "GeminiProvider::new: called");
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

    fn model_for(&self, request: &ChatRequest) -> String {
        request.model.clone().unwrap_or_else(|| self.settings.default_model.clone())
    }

    fn api_key(&self) -> &str {
        self.settings.api_key.as_deref().unwrap_or_default()
    }

    /// Build the generateContent request body
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = request.messages.iter().map(convert_message).collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "generationConfig": { "maxOutputTokens": request.max_tokens },
        });

        if let Some(temp) = request.temperature {
            body["generationConfig"]["temperature"] = serde_json::json!(temp);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!([{
                "functionDeclarations": request.tools.iter().map(|t| serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                })).collect::<Vec<_>>()
            }]);
        }

        body
    }

    /// Parse the generateContent response
    fn parse_response(&self, model: String, api_response: GeminiResponse) -> ChatResponse {
        let mut content = None;
        let mut tool_calls = Vec::new();
        let mut stop_reason = StopReason::EndTurn;

        if let Some(candidate) = api_response.candidates.into_iter().next() {
            if let Some(reason) = candidate.finish_reason.as_deref() {
                stop_reason = match reason {
                    "MAX_TOKENS" => StopReason::MaxTokens,
                    _ => StopReason::EndTurn,
                };
            }

            let mut text = String::new();
            for (n, part) in candidate.content.parts.into_iter().enumerate() {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(call) = part.function_call {
                    tool_calls.push(ToolCall {
                        id: format!("call_{n}"),
                        name: call.name,
                        input: call.args,
                    });
                }
            }
            if !text.is_empty() {
                content = Some(text);
            }
        }

        if !tool_calls.is_empty() {
            stop_reason = StopReason::ToolUse;
        }

        ChatResponse {
            content,
            tool_calls,
            stop_reason,
            usage: TokenUsage {
                input_tokens: api_response
                    .usage_metadata
                    .as_ref()
                    .map(|u| u.prompt_token_count)
                    .unwrap_or(0),
                output_tokens: api_response
                    .usage_metadata
                    .as_ref()
                    .map(|u| u.candidates_token_count)
                    .unwrap_or(0),
            },
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        }
    }
}

/// Convert one canonical message to a Gemini content object
fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        super::Role::User => "user",
        super::Role::Assistant => "model",
    };

    let parts: Vec<serde_json::Value> = match &msg.content {
        MessageContent::Text(text) => vec![serde_json::json!({ "text": text })],
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => serde_json::json!({ "text": text }),
                ContentBlock::ToolUse { name, input, .. } => serde_json::json!({
                    "functionCall": { "name": name, "args": input }
                }),
                ContentBlock::ToolResult { tool_use_id, content, .. } => serde_json::json!({
                    "functionResponse": {
                        "name": tool_use_id,
                        "response": { "content": content }
                    }
                }),
            })
            .collect(),
    };

    serde_json::json!({ "role": role, "parts": parts })
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> &str {
        &self.settings.id
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, max_tokens = request.max_tokens, "complete: called");
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.settings.base_url,
            model,
            self.api_key()
        );
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(60),
            });
        }
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let api_response: GeminiResponse = response.json().await?;
        Ok(self.parse_response(model, api_response))
    }

    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, "stream: called");
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.settings.base_url,
            model,
            self.api_key()
        );
        let body = self.build_request_body(&request);

        let response = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_content = String::new();
        let mut usage = TokenUsage::default();
        let mut stop_reason = StopReason::EndTurn;
        let mut saw_final = false;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(ProviderError::Network)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(piece) = serde_json::from_str::<GeminiResponse>(data) else {
                    continue;
                };

                if let Some(meta) = &piece.usage_metadata {
                    usage.input_tokens = meta.prompt_token_count;
                    usage.output_tokens = meta.candidates_token_count;
                }

                if let Some(candidate) = piece.candidates.first() {
                    for part in &candidate.content.parts {
                        if let Some(text) = &part.text {
                            full_content.push_str(text);
                            let _ = chunk_tx.send(StreamChunk::TextDelta(text.clone())).await;
                        }
                    }
                    if let Some(reason) = candidate.finish_reason.as_deref() {
                        saw_final = true;
                        stop_reason = match reason {
                            "MAX_TOKENS" => StopReason::MaxTokens,
                            _ => StopReason::EndTurn,
                        };
                    }
                }
            }
        }

        if !saw_final {
            debug!("stream: transport ended before a finishReason");
            return Err(ProviderError::StreamTruncated);
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone { stop_reason, usage })
            .await;

        Ok(ChatResponse {
            content: if full_content.is_empty() { None } else { Some(full_content) },
            tool_calls: vec![],
            stop_reason,
            usage,
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        })
    }
}

// Gemini API response types

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            id: "gemini".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: Some("test-key".to_string()),
            default_model: "gemini-2.0-flash".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_build_request_body() {
        let provider = GeminiProvider::new(settings()).unwrap();
        let request = ChatRequest::prompt("Be helpful", "Hello", 500);

        let body = provider.build_request_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be helpful");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 500);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
    }

    #[test]
    fn test_assistant_role_maps_to_model() {
        let wire = convert_message(&Message::assistant("answer"));
        assert_eq!(wire["role"], "model");
    }

    #[test]
    fn test_parse_response_with_function_call() {
        let provider = GeminiProvider::new(settings()).unwrap();
        let api_response: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "functionCall": { "name": "grep", "args": {"pattern": "todo"} } }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 5, "candidatesTokenCount": 2 }
        }))
        .unwrap();

        let response = provider.parse_response("gemini-2.0-flash".to_string(), api_response);
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.tool_calls[0].name, "grep");
        assert_eq!(response.usage.input_tokens, 5);
    }
}
