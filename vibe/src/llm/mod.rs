//! LLM provider layer
//!
//! Canonical request/response types, one adapter per backend wire format, and
//! the router that adds fallback ordering, circuit breaking, rate limiting,
//! and cost accounting on top.

use std::time::Duration;

mod anthropic;
pub mod circuit;
pub mod client;
mod error;
mod gemini;
mod ollama;
mod openai;
pub mod ratelimit;
pub mod registry;
mod router;
mod types;

pub use anthropic::AnthropicProvider;
pub use circuit::{CircuitBreaker, CircuitState};
pub use client::Provider;
pub use error::{ProviderError, RouterError};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use ratelimit::RateLimiter;
pub use registry::{ModelDescriptor, ModelTier, ProviderDescriptor};
pub use router::{
    DispatchOutcome, DispatchRecord, ProviderUsage, Router, RouterConfig, UsageEntry, UsageReport,
};
pub use types::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageContent, Role, StopReason, StreamChunk, TokenUsage,
    ToolCall, ToolDefinition,
};

/// Resolved connection settings for one provider adapter
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Provider id (matches the registry descriptor)
    pub id: String,

    /// Base URL
    pub base_url: String,

    /// API key, when the provider needs one
    pub api_key: Option<String>,

    /// Model used when the request carries no override
    pub default_model: String,

    /// HTTP client timeout
    pub timeout: Duration,
}
