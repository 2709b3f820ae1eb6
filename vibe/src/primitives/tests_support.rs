//! Shared fixtures for primitive tests

use std::sync::Arc;

use tempfile::{TempDir, tempdir};

use crate::checkpoint::CheckpointStore;
use crate::llm::client::mock::{MockOutcome, MockProvider, response_with};
use crate::llm::{Router, RouterConfig};
use crate::prompts::PromptRegistry;
use crate::state::StateManager;
use crate::tools::{ApprovalPolicy, ToolExecutor};

use super::{DeterminismMode, PrimitiveContext};

/// A context over a mock router that answers with the given texts in order
pub async fn context_with_responses(texts: Vec<&str>) -> (PrimitiveContext, TempDir) {
    let outcomes = texts
        .into_iter()
        .map(|t| MockOutcome::Ok(response_with("mock", t)))
        .collect();
    context_with_outcomes(outcomes).await
}

/// A context over a mock router with explicit outcomes
pub async fn context_with_outcomes(outcomes: Vec<MockOutcome>) -> (PrimitiveContext, TempDir) {
    let temp = tempdir().unwrap();

    let config = RouterConfig {
        default_provider: "mock".to_string(),
        fallbacks: vec![],
        ..Default::default()
    };
    let router = Arc::new(Router::with_providers(
        config,
        vec![Arc::new(MockProvider::new("mock", outcomes))],
    ));

    let ctx = PrimitiveContext {
        router,
        tools: Arc::new(ToolExecutor::standard()),
        checkpoints: Arc::new(CheckpointStore::open(temp.path().join(".vibe")).unwrap()),
        state: StateManager::in_memory().unwrap(),
        prompts: Arc::new(PromptRegistry::new().unwrap()),
        approval: ApprovalPolicy::auto(),
        workspace: temp.path().to_path_buf(),
        run_id: "run-test".to_string(),
        session_id: "sess-test".to_string(),
        determinism: DeterminismMode::Off,
        max_tokens: 1024,
    };

    (ctx, temp)
}
