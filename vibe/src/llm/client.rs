//! Provider trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChatRequest, ChatResponse, ProviderError, StreamChunk};

/// Stateless LLM backend - each call is independent
///
/// Implementations convert the canonical request into their wire format,
/// dispatch it, and parse the result back. They perform no retries and no
/// accounting; resilience and cost tracking live in the router.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider id (matches the registry descriptor)
    fn id(&self) -> &str;

    /// Send a single chat request (blocking until complete)
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Streaming chat: chunks are sent to the channel as they arrive.
    /// Returns the final assembled response.
    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, ProviderError>;
}

/// Test double; also used by the integration suites
pub mod mock {
    use super::*;
    use crate::llm::{StopReason, TokenUsage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted outcome for one mock call
    pub enum MockOutcome {
        Ok(ChatResponse),
        Err(fn() -> ProviderError),
    }

    /// Mock provider for unit tests - returns scripted outcomes in order
    pub struct MockProvider {
        id: String,
        outcomes: Mutex<Vec<MockOutcome>>,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        pub fn new(id: impl Into<String>, outcomes: Vec<MockOutcome>) -> Self {
            Self {
                id: id.into(),
                outcomes: Mutex::new(outcomes),
                call_count: AtomicUsize::new(0),
            }
        }

        /// A provider that always answers with the given text
        pub fn always(id: impl Into<String>, text: &str) -> Self {
            let id = id.into();
            let response = response_with(&id, text);
            Self {
                id,
                outcomes: Mutex::new(vec![MockOutcome::Ok(response)]),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    /// Build a plain mock response attributed to a provider
    pub fn response_with(provider: &str, text: &str) -> ChatResponse {
        ChatResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            model: "mock-model".to_string(),
            provider: provider.to_string(),
            cost_usd: 0.0,
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();

            if outcomes.is_empty() {
                return Err(ProviderError::InvalidResponse("No more mock outcomes".to_string()));
            }

            // The last outcome repeats so `always` providers stay alive
            let at = idx.min(outcomes.len() - 1);
            match &mut outcomes[at] {
                MockOutcome::Ok(response) => Ok(response.clone()),
                MockOutcome::Err(make) => Err(make()),
            }
        }

        async fn stream(
            &self,
            request: ChatRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<ChatResponse, ProviderError> {
            let response = self.complete(request).await?;
            if let Some(text) = &response.content {
                let _ = chunk_tx.send(StreamChunk::TextDelta(text.clone())).await;
            }
            let _ = chunk_tx
                .send(StreamChunk::MessageDone {
                    stop_reason: response.stop_reason,
                    usage: response.usage,
                })
                .await;
            Ok(response)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_returns_outcomes_in_order() {
            let provider = MockProvider::new(
                "mock",
                vec![
                    MockOutcome::Ok(response_with("mock", "one")),
                    MockOutcome::Ok(response_with("mock", "two")),
                ],
            );

            let req = ChatRequest::prompt("sys", "hi", 100);
            assert_eq!(provider.complete(req.clone()).await.unwrap().text(), "one");
            assert_eq!(provider.complete(req.clone()).await.unwrap().text(), "two");
            // Last outcome repeats
            assert_eq!(provider.complete(req).await.unwrap().text(), "two");
            assert_eq!(provider.call_count(), 3);
        }

        #[tokio::test]
        async fn test_mock_error_outcome() {
            let provider = MockProvider::new(
                "mock",
                vec![MockOutcome::Err(|| ProviderError::from_status(429, String::new()))],
            );

            let err = provider.complete(ChatRequest::prompt("s", "u", 10)).await.unwrap_err();
            assert!(err.is_rate_limit());
        }
    }
}
