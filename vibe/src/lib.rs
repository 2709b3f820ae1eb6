//! Vibe - an AI-assisted developer agent execution engine
//!
//! Given a natural-language task, vibe plans a sequence of tool invocations,
//! executes them against a local workspace, and iterates until a completion
//! signal is observed.
//!
//! # Core pieces
//!
//! - [`llm`] - provider router: fallback ordering, circuit breakers, rate
//!   limiting, streaming, cost accounting
//! - [`tools`] - tool registry and sandbox
//! - [`checkpoint`] - pre-mutation snapshots with rollback
//! - [`primitives`] - the closed operation set the orchestrator dispatches
//! - [`orchestrator`] - plan execution with persisted run/step history
//! - [`r#loop`] - the autonomous iteration envelope
//!
//! Context selection lives in the `contextkit` crate; persistence in
//! `sessionstore`.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod orchestrator;
pub mod primitives;
pub mod prompts;
pub mod server;
pub mod state;
pub mod tools;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use checkpoint::{ChangeType, Checkpoint, CheckpointStore, FileChange, RollbackReport};
pub use config::Config;
pub use domain::{AgentPhase, AgentStep, Plan, PlanStep, Task};
pub use llm::{
    ChatRequest, ChatResponse, Provider, ProviderError, Router, RouterConfig, RouterError, StreamChunk, TokenUsage,
};
pub use orchestrator::{CancelFlag, FailurePolicy, Orchestrator, RunOutcome, StepOutcome};
pub use primitives::{DeterminismMode, Primitive, PrimitiveContext, PrimitiveError};
pub use prompts::PromptRegistry;
pub use r#loop::{ExitReason, LoopConfig, LoopEngine, LoopResult, Session, SessionStatus};
pub use state::StateManager;
pub use tools::{ApprovalGate, ApprovalMode, ApprovalPolicy, RiskLevel, Tool, ToolContext, ToolExecutor, ToolResult};
