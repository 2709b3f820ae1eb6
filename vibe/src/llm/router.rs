//! Provider router: fallback ordering, resilience, cost accounting
//!
//! Dispatches one request across the configured fallback order with
//! at-most-once per provider. Each provider carries its own circuit breaker
//! and sliding-window rate limiter; usage and cost are accounted centrally so
//! adapters stay one-way (no back-references).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::circuit::{CircuitBreaker, CircuitState};
use super::ratelimit::RateLimiter;
use super::registry;
use super::{
    AnthropicProvider, ChatRequest, ChatResponse, GeminiProvider, OllamaProvider, OpenAiProvider, Provider,
    ProviderError, ProviderSettings, RouterError, StreamChunk, TokenUsage,
};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Provider tried first
    pub default_provider: String,

    /// Providers tried after the default, in order
    pub fallbacks: Vec<String>,

    /// Rate limiter: max requests per window, per provider
    pub rate_max_requests: usize,

    /// Rate limiter window
    pub rate_window_ms: u64,

    /// Circuit breaker failure threshold
    pub failure_threshold: u32,

    /// Circuit breaker reset timeout
    pub reset_timeout_ms: u64,

    /// Per-request deadline, non-streaming
    pub request_timeout_ms: u64,

    /// Per-request deadline, streaming
    pub stream_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_provider: "anthropic".to_string(),
            fallbacks: vec!["openai".to_string(), "gemini".to_string(), "ollama".to_string()],
            rate_max_requests: 100,
            rate_window_ms: 60_000,
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
            stream_timeout_ms: 120_000,
        }
    }
}

/// Why a provider was not dispatched, or how its dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Skipped { reason: String },
    Failed { classification: String },
    Succeeded,
}

/// One entry in the dispatch log of a single chat/stream call
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub provider: String,
    pub outcome: DispatchOutcome,
}

/// Per-provider usage accumulator
#[derive(Debug, Clone, Default)]
pub struct ProviderUsage {
    pub requests: u64,
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

/// One usage-history entry, appended per successful response
#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub at_ms: i64,
}

/// Cumulative usage snapshot
#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub totals: TokenUsage,
    pub cost_usd: f64,
    pub per_provider: HashMap<String, ProviderUsage>,
}

struct ProviderSlot {
    provider: Arc<dyn Provider>,
    circuit: CircuitBreaker,
    limiter: RateLimiter,
}

#[derive(Default)]
struct Ledger {
    report: UsageReport,
    history: Vec<UsageEntry>,
}

/// The provider router
pub struct Router {
    config: RouterConfig,
    slots: HashMap<String, ProviderSlot>,
    ledger: Mutex<Ledger>,
    last_dispatch: Mutex<Vec<DispatchRecord>>,
}

impl Router {
    /// Build a router from config, constructing an adapter for every
    /// configured provider in the fallback order.
    pub fn new(config: RouterConfig) -> Self {
        debug!(default = %config.default_provider, "Router::new: called");
        let mut slots = HashMap::new();

        for id in Self::order_of(&config) {
            match Self::build_provider(&id, &config) {
                Ok(Some(provider)) => {
                    slots.insert(id.clone(), Self::slot(provider, &config));
                }
                Ok(None) => {
                    debug!(provider = %id, "Router::new: not configured, skipping");
                }
                Err(e) => {
                    warn!(provider = %id, error = %e, "Router::new: failed to construct provider");
                }
            }
        }

        info!(providers = slots.len(), "Router ready");
        Self {
            config,
            slots,
            ledger: Mutex::new(Ledger::default()),
            last_dispatch: Mutex::new(Vec::new()),
        }
    }

    /// Build a router over explicit provider implementations (tests)
    pub fn with_providers(config: RouterConfig, providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut slots = HashMap::new();
        for provider in providers {
            let id = provider.id().to_string();
            slots.insert(id, Self::slot(provider, &config));
        }
        Self {
            config,
            slots,
            ledger: Mutex::new(Ledger::default()),
            last_dispatch: Mutex::new(Vec::new()),
        }
    }

    fn slot(provider: Arc<dyn Provider>, config: &RouterConfig) -> ProviderSlot {
        ProviderSlot {
            provider,
            circuit: CircuitBreaker::new(config.failure_threshold, Duration::from_millis(config.reset_timeout_ms)),
            limiter: RateLimiter::new(config.rate_max_requests, Duration::from_millis(config.rate_window_ms)),
        }
    }

    fn build_provider(id: &str, config: &RouterConfig) -> Result<Option<Arc<dyn Provider>>, ProviderError> {
        let Some(desc) = registry::provider(id) else {
            return Err(ProviderError::NotFound(format!("provider '{id}'")));
        };
        if !desc.is_configured() {
            return Ok(None);
        }

        let settings = ProviderSettings {
            id: desc.id.to_string(),
            base_url: desc.base_url.to_string(),
            api_key: std::env::var(desc.api_key_env).ok().filter(|v| !v.is_empty()),
            default_model: desc.default_model.to_string(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        };

        let provider: Arc<dyn Provider> = match id {
            "anthropic" => Arc::new(AnthropicProvider::new(settings)?),
            "openai" => Arc::new(OpenAiProvider::new(settings)?),
            "gemini" => Arc::new(GeminiProvider::new(settings)?),
            "ollama" => Arc::new(OllamaProvider::new(settings)?),
            "compat" => Arc::new(OpenAiProvider::compat(settings)?),
            other => return Err(ProviderError::NotFound(format!("provider '{other}'"))),
        };
        Ok(Some(provider))
    }

    fn order_of(config: &RouterConfig) -> Vec<String> {
        let mut order = vec![config.default_provider.clone()];
        for id in &config.fallbacks {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        order
    }

    /// Configured fallback order (deduplicated)
    pub fn fallback_order(&self) -> Vec<String> {
        Self::order_of(&self.config)
    }

    /// All provider descriptors with their configured flag
    pub fn list_providers(&self) -> Vec<(&'static str, bool)> {
        registry::PROVIDERS.iter().map(|p| (p.id, self.slots.contains_key(p.id))).collect()
    }

    /// Whether a provider is usable right now
    pub fn is_configured(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// First usable provider in the fallback order
    pub fn current_provider(&self) -> Option<String> {
        self.fallback_order().into_iter().find(|id| self.slots.contains_key(id))
    }

    /// Administrative circuit reset
    pub fn reset_circuit(&self, id: &str) -> bool {
        match self.slots.get(id) {
            Some(slot) => {
                slot.circuit.reset();
                true
            }
            None => false,
        }
    }

    /// Circuit state for a provider (for status output)
    pub fn circuit_state(&self, id: &str) -> Option<CircuitState> {
        self.slots.get(id).map(|s| s.circuit.state())
    }

    /// Circuit failure count for a provider
    pub fn circuit_failures(&self, id: &str) -> Option<u32> {
        self.slots.get(id).map(|s| s.circuit.failure_count())
    }

    /// Cumulative usage snapshot
    pub fn usage(&self) -> UsageReport {
        self.ledger.lock().unwrap().report.clone()
    }

    /// Usage history entries, oldest first
    pub fn usage_history(&self) -> Vec<UsageEntry> {
        self.ledger.lock().unwrap().history.clone()
    }

    /// Dispatch log of the most recent chat/stream call
    pub fn dispatch_log(&self) -> Vec<DispatchRecord> {
        self.last_dispatch.lock().unwrap().clone()
    }

    /// Non-streaming completion with fallback
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, RouterError> {
        self.dispatch(request, None).await
    }

    /// Streaming completion with fallback. Chunks from the winning provider
    /// are forwarded to `chunk_tx`; the assembled response is returned.
    pub async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, RouterError> {
        self.dispatch(request, Some(chunk_tx)).await
    }

    /// Fallback core: at most one dispatch per provider per call.
    async fn dispatch(
        &self,
        request: ChatRequest,
        stream_tx: Option<mpsc::Sender<StreamChunk>>,
    ) -> Result<ChatResponse, RouterError> {
        let timeout = if stream_tx.is_some() {
            Duration::from_millis(self.config.stream_timeout_ms)
        } else {
            Duration::from_millis(self.config.request_timeout_ms)
        };

        let order = self.fallback_order();
        let mut log: Vec<DispatchRecord> = Vec::new();
        let mut last_err: Option<ProviderError> = None;

        let intent = request.last_user_text().unwrap_or_default().to_string();

        for id in &order {
            let Some(slot) = self.slots.get(id) else {
                log.push(DispatchRecord {
                    provider: id.clone(),
                    outcome: DispatchOutcome::Skipped {
                        reason: "not configured".to_string(),
                    },
                });
                continue;
            };

            if slot.circuit.state() == CircuitState::Open {
                debug!(provider = %id, "dispatch: circuit open, skipping");
                log.push(DispatchRecord {
                    provider: id.clone(),
                    outcome: DispatchOutcome::Skipped {
                        reason: "circuit open".to_string(),
                    },
                });
                continue;
            }

            if !slot.limiter.try_acquire() {
                debug!(provider = %id, "dispatch: rate limited, skipping");
                log.push(DispatchRecord {
                    provider: id.clone(),
                    outcome: DispatchOutcome::Skipped {
                        reason: "rate limited".to_string(),
                    },
                });
                continue;
            }

            if !slot.circuit.try_acquire() {
                debug!(provider = %id, "dispatch: half-open probe in flight, skipping");
                log.push(DispatchRecord {
                    provider: id.clone(),
                    outcome: DispatchOutcome::Skipped {
                        reason: "probe in flight".to_string(),
                    },
                });
                continue;
            }

            // Resolve the model for this provider unless the caller pinned one
            let mut req = request.clone();
            if req.model.is_none() {
                req.model = Some(registry::model_for_intent(id, &intent).to_string());
            }

            debug!(provider = %id, model = ?req.model, "dispatch: calling provider");
            let attempt = async {
                match &stream_tx {
                    Some(tx) => slot.provider.stream(req, tx.clone()).await,
                    None => slot.provider.complete(req).await,
                }
            };
            let outcome = match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            };

            match outcome {
                Ok(mut response) => {
                    slot.circuit.record_success();
                    response.provider = id.clone();
                    response.cost_usd = registry::cost_usd(&response.model, &response.usage);
                    self.account(&response);

                    log.push(DispatchRecord {
                        provider: id.clone(),
                        outcome: DispatchOutcome::Succeeded,
                    });
                    *self.last_dispatch.lock().unwrap() = log;

                    info!(provider = %id, model = %response.model, cost_usd = response.cost_usd, "dispatch: success");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(provider = %id, error = %e, class = e.classification(), "dispatch: provider failed");
                    slot.circuit.record_failure();
                    log.push(DispatchRecord {
                        provider: id.clone(),
                        outcome: DispatchOutcome::Failed {
                            classification: e.classification().to_string(),
                        },
                    });
                    last_err = Some(e);
                }
            }
        }

        *self.last_dispatch.lock().unwrap() = log;

        if self.slots.is_empty() {
            return Err(RouterError::NoProviderConfigured);
        }

        Err(RouterError::AllProvidersUnavailable {
            last: Box::new(
                last_err.unwrap_or_else(|| ProviderError::InvalidResponse("all providers skipped".to_string())),
            ),
        })
    }

    fn account(&self, response: &ChatResponse) {
        let mut ledger = self.ledger.lock().unwrap();

        ledger.report.totals.add(&response.usage);
        ledger.report.cost_usd += response.cost_usd;

        let per = ledger.report.per_provider.entry(response.provider.clone()).or_default();
        per.requests += 1;
        per.usage.add(&response.usage);
        per.cost_usd += response.cost_usd;

        ledger.history.push(UsageEntry {
            provider: response.provider.clone(),
            model: response.model.clone(),
            usage: response.usage,
            cost_usd: response.cost_usd,
            at_ms: chrono::Utc::now().timestamp_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockOutcome, MockProvider, response_with};

    fn config(order: &[&str]) -> RouterConfig {
        RouterConfig {
            default_provider: order[0].to_string(),
            fallbacks: order[1..].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::prompt("system", "hello", 100)
    }

    #[tokio::test]
    async fn test_first_provider_wins() {
        let router = Router::with_providers(
            config(&["a", "b"]),
            vec![
                Arc::new(MockProvider::always("a", "from a")),
                Arc::new(MockProvider::always("b", "from b")),
            ],
        );

        let response = router.chat(request()).await.unwrap();
        assert_eq!(response.text(), "from a");
        assert_eq!(response.provider, "a");

        let log = router.dispatch_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, DispatchOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_failover_records_each_provider_once() {
        let failing = Arc::new(MockProvider::new(
            "a",
            vec![MockOutcome::Err(|| ProviderError::from_status(429, String::new()))],
        ));
        let router = Router::with_providers(
            config(&["a", "b"]),
            vec![failing.clone(), Arc::new(MockProvider::always("b", "from b"))],
        );

        let response = router.chat(request()).await.unwrap();
        assert_eq!(response.provider, "b");

        // Dispatch log: a failed once, b succeeded once; at most once each
        let log = router.dispatch_log();
        let a_count = log.iter().filter(|r| r.provider == "a").count();
        let b_count = log.iter().filter(|r| r.provider == "b").count();
        assert_eq!((a_count, b_count), (1, 1));
        assert!(matches!(log[0].outcome, DispatchOutcome::Failed { .. }));

        // A's breaker saw exactly one failure
        assert_eq!(router.circuit_failures("a"), Some(1));
        assert_eq!(failing.call_count(), 1);

        // Usage attributed to b only
        let usage = router.usage();
        assert!(usage.per_provider.contains_key("b"));
        assert!(!usage.per_provider.contains_key("a"));
        assert_eq!(router.usage_history().len(), 1);
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_error() {
        let router = Router::with_providers(
            config(&["a", "b"]),
            vec![
                Arc::new(MockProvider::new(
                    "a",
                    vec![MockOutcome::Err(|| ProviderError::from_status(500, "a down".into()))],
                )),
                Arc::new(MockProvider::new(
                    "b",
                    vec![MockOutcome::Err(|| ProviderError::from_status(401, "bad key".into()))],
                )),
            ],
        );

        let err = router.chat(request()).await.unwrap_err();
        match err {
            RouterError::AllProvidersUnavailable { last } => {
                assert!(matches!(*last, ProviderError::Authentication(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_open_circuit_skips_without_dispatch() {
        let failing = Arc::new(MockProvider::new(
            "a",
            vec![MockOutcome::Err(|| ProviderError::from_status(500, String::new()))],
        ));
        let mut cfg = config(&["a", "b"]);
        cfg.failure_threshold = 1;
        cfg.reset_timeout_ms = 60_000;

        let router = Router::with_providers(cfg, vec![failing.clone(), Arc::new(MockProvider::always("b", "ok"))]);

        // First call trips a's breaker
        router.chat(request()).await.unwrap();
        assert_eq!(failing.call_count(), 1);

        // Second call: a skipped without dispatch
        router.chat(request()).await.unwrap();
        assert_eq!(failing.call_count(), 1);

        let log = router.dispatch_log();
        assert!(matches!(
            &log[0].outcome,
            DispatchOutcome::Skipped { reason } if reason == "circuit open"
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_denial_skips() {
        let mut cfg = config(&["a", "b"]);
        cfg.rate_max_requests = 1;
        cfg.rate_window_ms = 60_000;

        let a = Arc::new(MockProvider::always("a", "from a"));
        let router = Router::with_providers(cfg, vec![a.clone(), Arc::new(MockProvider::always("b", "from b"))]);

        assert_eq!(router.chat(request()).await.unwrap().provider, "a");
        // Window is full for a; falls through to b
        assert_eq!(router.chat(request()).await.unwrap().provider, "b");
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_providers_configured() {
        let router = Router::with_providers(config(&["a"]), vec![]);
        assert!(matches!(
            router.chat(request()).await.unwrap_err(),
            RouterError::NoProviderConfigured
        ));
    }

    #[tokio::test]
    async fn test_reset_circuit() {
        let mut cfg = config(&["a"]);
        cfg.failure_threshold = 1;

        let router = Router::with_providers(
            cfg,
            vec![Arc::new(MockProvider::new(
                "a",
                vec![
                    MockOutcome::Err(|| ProviderError::from_status(500, String::new())),
                    MockOutcome::Ok(response_with("a", "recovered")),
                ],
            ))],
        );

        assert!(router.chat(request()).await.is_err());
        assert_eq!(router.circuit_state("a"), Some(CircuitState::Open));

        assert!(router.reset_circuit("a"));
        let response = router.chat(request()).await.unwrap();
        assert_eq!(response.text(), "recovered");
    }

    #[tokio::test]
    async fn test_streaming_forwards_chunks() {
        let router = Router::with_providers(
            config(&["a"]),
            vec![Arc::new(MockProvider::always("a", "streamed text"))],
        );

        let (tx, mut rx) = mpsc::channel(16);
        let response = router.stream(request(), tx).await.unwrap();
        assert_eq!(response.text(), "streamed text");

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamChunk::TextDelta(ref t) if t == "streamed text"));
        let done = rx.recv().await.unwrap();
        assert!(matches!(done, StreamChunk::MessageDone { .. }));
    }
}
