//! Autonomous loop
//!
//! Wraps the planner/executor/reviewer envelope in an iteration loop with
//! exit detection, stuck detection, budgets, and its own circuit breaker.

mod analyzer;
mod engine;
mod session;

pub use analyzer::{Analysis, AnalyzerConfig, DEFAULT_COMPLETION_SIGNAL, ResponseAnalyzer, STUCK_MARKERS};
pub use engine::{ExitReason, LoopConfig, LoopEngine, LoopResult, LoopStats};
pub use session::{IterationRecord, Session, SessionStatus};
