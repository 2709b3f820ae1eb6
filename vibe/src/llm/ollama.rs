//! Ollama local HTTP client
//!
//! Talks to a local Ollama daemon. No API key; streaming is newline-delimited
//! JSON rather than SSE.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageContent, Provider, ProviderError, ProviderSettings,
    StopReason, StreamChunk, TokenUsage,
};

/// Ollama local API client
pub struct OllamaProvider {
    settings: ProviderSettings,
    http: Client,
}

impl OllamaProvider {
    /// Create a client; no key is required
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        debug!(provider = %settings.id, base_url = %settings.base_url, "OllamaProvider::new: called");
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { settings, http })
    }

    fn model_for(&self, request: &ChatRequest) -> String {
        request.model.clone().unwrap_or_else(|| self.settings.default_model.clone())
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];

        for msg in &request.messages {
            let role = match msg.role {
                super::Role::User => "user",
                super::Role::Assistant => "assistant",
            };
            let text = match &msg.content {
                MessageContent::Text(text) => text.clone(),
                MessageContent::Blocks(blocks) => blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
                        ContentBlock::ToolUse { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            messages.push(serde_json::json!({ "role": role, "content": text }));
        }

        serde_json::json!({
            "model": self.model_for(request),
            "messages": messages,
            "stream": stream,
            "options": { "num_predict": request.max_tokens },
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn id(&self) -> &str {
        &self.settings.id
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, "complete: called");
        let url = format!("{}/api/chat", self.settings.base_url);
        let body = self.build_request_body(&request, false);

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let api_response: OllamaResponse = response.json().await?;
        Ok(ChatResponse {
            content: Some(api_response.message.content).filter(|c| !c.is_empty()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: api_response.prompt_eval_count.unwrap_or(0),
                output_tokens: api_response.eval_count.unwrap_or(0),
            },
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        })
    }

    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, ProviderError> {
        let model = self.model_for(&request);
        debug!(%model, "stream: called");
        let url = format!("{}/api/chat", self.settings.base_url);
        let body = self.build_request_body(&request, true);

        let response = self.http.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_content = String::new();
        let mut usage = TokenUsage::default();
        let mut done = false;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(ProviderError::Network)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Newline-delimited JSON framing
            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();
                if line.is_empty() {
                    continue;
                }

                let Ok(piece) = serde_json::from_str::<OllamaResponse>(&line) else {
                    continue;
                };

                if !piece.message.content.is_empty() {
                    full_content.push_str(&piece.message.content);
                    let _ = chunk_tx.send(StreamChunk::TextDelta(piece.message.content.clone())).await;
                }

                if piece.done {
                    done = true;
                    usage.input_tokens = piece.prompt_eval_count.unwrap_or(0);
                    usage.output_tokens = piece.eval_count.unwrap_or(0);
                }
            }
        }

        if !done {
            debug!("stream: transport ended before done marker");
            return Err(ProviderError::StreamTruncated);
        }

        let _ = chunk_tx
            .send(StreamChunk::MessageDone {
                stop_reason: StopReason::EndTurn,
                usage,
            })
            .await;

        Ok(ChatResponse {
            content: if full_content.is_empty() { None } else { Some(full_content) },
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage,
            model,
            provider: self.settings.id.clone(),
            cost_usd: 0.0,
        })
    }
}

// Ollama API response types

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            id: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            default_model: "llama3.1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_no_key_required() {
        assert!(OllamaProvider::new(settings()).is_ok());
    }

    #[test]
    fn test_build_request_body() {
        let provider = OllamaProvider::new(settings()).unwrap();
        let request = ChatRequest::prompt("sys", "hello", 256);

        let body = provider.build_request_body(&request, false);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[test]
    fn test_blocks_flatten_to_text() {
        let provider = OllamaProvider::new(settings()).unwrap();
        let request = ChatRequest {
            system_prompt: "s".to_string(),
            messages: vec![Message::user_blocks(vec![
                ContentBlock::text("part one"),
                ContentBlock::tool_result("id", "part two", false),
            ])],
            tools: vec![],
            max_tokens: 10,
            temperature: None,
            model: None,
        };

        let body = provider.build_request_body(&request, false);
        assert_eq!(body["messages"][1]["content"], "part one\npart two");
    }
}
