//! Determinism primitive - record/replay for tool calls
//!
//! In record mode every wrapped tool call is appended to the run's I/O log.
//! In replay mode the log is consumed in order; a live (tool, input) pair
//! that diverges from the recorded one fails the run with ReplayMismatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;
use tracing::{debug, info};

use sessionstore::{IoLogEntry, now_ms};

use super::{PrimitiveContext, PrimitiveError};

/// How tool calls are treated for reproducibility
#[derive(Clone, Default)]
pub enum DeterminismMode {
    /// Tool calls run live, nothing is logged
    #[default]
    Off,

    /// Tool calls run live and are appended to the I/O log
    Record { cursor: Arc<AtomicU32> },

    /// Tool calls are served from the I/O log in order
    Replay { cursor: Arc<AtomicU32> },
}

impl DeterminismMode {
    /// Fresh record mode
    pub fn record() -> Self {
        Self::Record {
            cursor: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fresh replay mode
    pub fn replay() -> Self {
        Self::Replay {
            cursor: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl std::fmt::Debug for DeterminismMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::Record { .. } => write!(f, "Record"),
            Self::Replay { .. } => write!(f, "Replay"),
        }
    }
}

/// Run one tool call under the context's determinism mode
pub async fn call_tool(ctx: &PrimitiveContext, tool: &str, args: Value) -> Result<Value, PrimitiveError> {
    match &ctx.determinism {
        DeterminismMode::Off => {
            let result = ctx.tools.execute(tool, args, &ctx.tool_context()).await;
            Ok(serde_json::to_value(result).map_err(|e| PrimitiveError::Validation(e.to_string()))?)
        }
        DeterminismMode::Record { cursor } => {
            let seq = cursor.fetch_add(1, Ordering::SeqCst);
            debug!(%tool, seq, "call_tool: recording");

            let result = ctx.tools.execute(tool, args.clone(), &ctx.tool_context()).await;
            let output = serde_json::to_value(&result).map_err(|e| PrimitiveError::Validation(e.to_string()))?;

            ctx.state
                .append_io(&IoLogEntry {
                    run_id: ctx.run_id.clone(),
                    seq,
                    tool: tool.to_string(),
                    input: args,
                    output: output.clone(),
                    created_at: now_ms(),
                })
                .await?;
            Ok(output)
        }
        DeterminismMode::Replay { cursor } => {
            let seq = cursor.fetch_add(1, Ordering::SeqCst);
            debug!(%tool, seq, "call_tool: replaying");

            let log = ctx.state.replay_log(&ctx.run_id).await?;
            let Some(entry) = log.get(seq as usize) else {
                return Err(PrimitiveError::ReplayMismatch {
                    seq,
                    recorded: "<end of log>".to_string(),
                    live: tool.to_string(),
                });
            };

            if entry.tool != tool || entry.input != args {
                return Err(PrimitiveError::ReplayMismatch {
                    seq,
                    recorded: format!("{}({})", entry.tool, entry.input),
                    live: format!("{tool}({args})"),
                });
            }

            info!(%tool, seq, "call_tool: served from replay log");
            Ok(entry.output.clone())
        }
    }
}

/// Primitive entry point: input `{"tool": "...", "tool_args": {...},
/// "mode"?: "record"|"replay"}`. Without a mode override the context's mode
/// applies.
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    let Some(tool) = input["tool"].as_str() else {
        return Err(PrimitiveError::Validation("tool is required".to_string()));
    };
    let args = input.get("tool_args").cloned().unwrap_or_else(|| serde_json::json!({}));

    match input["mode"].as_str() {
        None => call_tool(ctx, tool, args).await,
        Some(mode) => {
            let mut scoped = ctx.clone();
            scoped.determinism = match mode {
                "record" => DeterminismMode::record(),
                "replay" => DeterminismMode::replay(),
                "off" => DeterminismMode::Off,
                other => return Err(PrimitiveError::Validation(format!("unknown determinism mode '{other}'"))),
            };
            call_tool(&scoped, tool, args).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::tests_support::context_with_responses;

    #[tokio::test]
    async fn test_record_then_replay_roundtrip() {
        let (mut ctx, temp) = context_with_responses(vec![]).await;
        std::fs::write(temp.path().join("a.txt"), "stable content").unwrap();

        // Record a read
        ctx.determinism = DeterminismMode::record();
        let recorded = call_tool(&ctx, "read_file", serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(recorded["output"], "stable content");

        // Mutate the file; replay must return the recorded bytes
        std::fs::write(temp.path().join("a.txt"), "changed!").unwrap();
        ctx.determinism = DeterminismMode::replay();
        let replayed = call_tool(&ctx, "read_file", serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(replayed["output"], "stable content");
    }

    #[tokio::test]
    async fn test_replay_mismatch_on_divergent_call() {
        let (mut ctx, temp) = context_with_responses(vec![]).await;
        std::fs::write(temp.path().join("a.txt"), "content").unwrap();

        ctx.determinism = DeterminismMode::record();
        call_tool(&ctx, "read_file", serde_json::json!({"path": "a.txt"})).await.unwrap();

        ctx.determinism = DeterminismMode::replay();
        let err = call_tool(&ctx, "list_directory", serde_json::json!({"path": "."}))
            .await
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::ReplayMismatch { seq: 0, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_replay_past_end_of_log() {
        let (mut ctx, _temp) = context_with_responses(vec![]).await;

        ctx.determinism = DeterminismMode::replay();
        let err = call_tool(&ctx, "list_directory", serde_json::json!({"path": "."}))
            .await
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::ReplayMismatch { .. }));
    }

    #[tokio::test]
    async fn test_off_mode_logs_nothing() {
        let (ctx, temp) = context_with_responses(vec![]).await;
        std::fs::write(temp.path().join("a.txt"), "x").unwrap();

        call_tool(&ctx, "read_file", serde_json::json!({"path": "a.txt"})).await.unwrap();
        assert!(ctx.state.replay_log(&ctx.run_id).await.unwrap().is_empty());
    }
}
