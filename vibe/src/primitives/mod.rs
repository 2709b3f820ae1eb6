//! Primitives
//!
//! The closed set of operations the orchestrator can dispatch. Each primitive
//! has a uniform `execute(input) -> output` contract; dispatch is a match
//! over the enum, so an unknown primitive is a parse error rather than a
//! runtime lookup failure.

mod agentic;
mod approval;
#[cfg(test)]
pub mod tests_support;
mod completion;
mod determinism;
mod execution;
mod memory;
mod multi_edit;
mod planner;
mod review;
mod search;

pub use agentic::{AgenticOutcome, run_agentic_loop};
pub use determinism::DeterminismMode;
pub use planner::extract_json_object;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::llm::{Router, RouterError};
use crate::prompts::PromptRegistry;
use crate::state::StateManager;
use crate::tools::{ApprovalPolicy, ToolContext, ToolExecutor};
use sessionstore::StoreError;

/// The closed primitive set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Planning,
    Completion,
    Execution,
    MultiEdit,
    Approval,
    Memory,
    Determinism,
    Review,
    Search,
}

impl Primitive {
    /// Every primitive, in a stable order
    pub const ALL: &'static [Primitive] = &[
        Primitive::Planning,
        Primitive::Completion,
        Primitive::Execution,
        Primitive::MultiEdit,
        Primitive::Approval,
        Primitive::Memory,
        Primitive::Determinism,
        Primitive::Review,
        Primitive::Search,
    ];

    /// Stable name used in plans and persisted steps
    pub fn name(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Completion => "completion",
            Self::Execution => "execution",
            Self::MultiEdit => "multi_edit",
            Self::Approval => "approval",
            Self::Memory => "memory",
            Self::Determinism => "determinism",
            Self::Review => "review",
            Self::Search => "search",
        }
    }

    /// Parse a plan's primitive name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Comma-separated list for prompts
    pub fn names() -> String {
        Self::ALL.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors from primitive execution
#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("Tool failed: {0}")]
    Tool(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Approval denied: {0}")]
    Denied(String),

    #[error("Replay mismatch at call {seq}: recorded {recorded}, live {live}")]
    ReplayMismatch { seq: u32, recorded: String, live: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PrimitiveError {
    /// Stable classification tag for the persisted Step error column
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Router(e) => e.classification(),
            Self::Tool(_) => "internal",
            Self::Validation(_) => "validation",
            Self::Denied(_) => "permission",
            Self::ReplayMismatch { .. } => "replay_mismatch",
            Self::Store(_) => "internal",
            Self::Checkpoint(_) => "internal",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Replay mismatches kill the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReplayMismatch { .. })
    }
}

/// Everything a primitive may need, threaded explicitly (no process-wide
/// singletons)
#[derive(Clone)]
pub struct PrimitiveContext {
    pub router: Arc<Router>,
    pub tools: Arc<ToolExecutor>,
    pub checkpoints: Arc<CheckpointStore>,
    pub state: StateManager,
    pub prompts: Arc<PromptRegistry>,
    pub approval: ApprovalPolicy,
    pub workspace: PathBuf,
    pub run_id: String,
    pub session_id: String,
    pub determinism: DeterminismMode,
    pub max_tokens: u32,
}

impl PrimitiveContext {
    /// Tool context scoped to this run, carrying its approval policy
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.workspace.clone(), self.run_id.clone())
            .with_checkpoints(Arc::clone(&self.checkpoints), self.session_id.clone())
            .with_state(self.state.clone())
            .with_approval(self.approval.clone())
    }
}

/// Dispatch one primitive invocation
pub async fn execute(
    primitive: Primitive,
    ctx: &PrimitiveContext,
    input: Value,
) -> Result<Value, PrimitiveError> {
    debug!(primitive = %primitive, run_id = %ctx.run_id, "execute: called");
    match primitive {
        Primitive::Planning => planner::run(ctx, input).await,
        Primitive::Completion => completion::run(ctx, input).await,
        Primitive::Execution => execution::run(ctx, input).await,
        Primitive::MultiEdit => multi_edit::run(ctx, input).await,
        Primitive::Approval => approval::run(ctx, input).await,
        Primitive::Memory => memory::run(ctx, input).await,
        Primitive::Determinism => determinism::run(ctx, input).await,
        Primitive::Review => review::run(ctx, input).await,
        Primitive::Search => search::run(ctx, input).await,
    }
}

/// Plan a task: parse and validate the planner's JSON
pub use planner::plan_task;

/// The approval decision shared with the orchestrator's plan gate
pub use approval::decide as approval_decide;
