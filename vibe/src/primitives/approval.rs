//! Approval primitive
//!
//! Auto mode approves unconditionally, never denies unconditionally, prompt
//! consults the gate supplied by the embedding surface.

use serde_json::Value;
use tracing::{debug, info};

use crate::tools::{ApprovalMode, RiskLevel};

use super::{PrimitiveContext, PrimitiveError};

/// Input: `{"summary": "...", "steps": ["..."], "risk": "low|medium|high|critical"}`
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    let Some(summary) = input["summary"].as_str() else {
        return Err(PrimitiveError::Validation("summary is required".to_string()));
    };

    let steps: Vec<String> = input["steps"]
        .as_array()
        .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let risk: RiskLevel = input["risk"]
        .as_str()
        .unwrap_or("medium")
        .parse()
        .map_err(PrimitiveError::Validation)?;

    let approved = decide(ctx, summary, &steps, risk).await;
    info!(run_id = %ctx.run_id, %risk, approved, "Approval decided");
    Ok(serde_json::json!({ "approved": approved }))
}

/// The decision itself, shared with the orchestrator's plan gate
pub async fn decide(ctx: &PrimitiveContext, summary: &str, steps: &[String], risk: RiskLevel) -> bool {
    debug!(mode = ?ctx.approval.mode, %risk, "decide: called");
    match ctx.approval.mode {
        ApprovalMode::Auto => true,
        ApprovalMode::Never => false,
        ApprovalMode::Prompt => ctx.approval.gate.confirm(summary, steps, risk).await,
    }
}
