//! Core domain types: tasks, plans, runtime step records

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{ApprovalMode, RiskLevel};

/// Immutable task input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Free-form description of what to do
    pub description: String,

    /// Caller-supplied structured context
    #[serde(default)]
    pub context: HashMap<String, Value>,

    /// How approvals are resolved for this task
    #[serde(default)]
    pub approval_mode: ApprovalMode,

    /// Optional cap on plan steps
    #[serde(default)]
    pub max_steps: Option<u32>,

    /// Create a named checkpoint when the run completes
    #[serde(default)]
    pub checkpoint_on_complete: bool,
}

impl Task {
    /// A plain task with defaults
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: HashMap::new(),
            approval_mode: ApprovalMode::default(),
            max_steps: None,
            checkpoint_on_complete: false,
        }
    }

    /// Set the approval mode
    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }
}

/// One step of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Human description of the step
    pub description: String,

    /// Primitive that executes it
    pub primitive: String,

    /// Arguments passed to the primitive
    #[serde(default)]
    pub args: Value,

    /// Why the planner chose this step
    #[serde(default)]
    pub reason: Option<String>,

    /// Estimated risk of the step
    #[serde(default)]
    pub risk: RiskLevel,
}

/// An ordered plan emitted by the planner
///
/// The wire shape matches the planner prompt contract:
/// `{"steps": [...], "tools": [...], "estimatedRisk": "low"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,

    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default, rename = "estimatedRisk")]
    pub estimated_risk: RiskLevel,
}

impl Plan {
    /// Aggregate risk: the declared estimate or the max over steps,
    /// whichever is higher
    pub fn aggregate_risk(&self) -> RiskLevel {
        self.steps
            .iter()
            .map(|s| s.risk)
            .chain(std::iter::once(self.estimated_risk))
            .max()
            .unwrap_or_default()
    }

    /// Truncate to a step cap, when the task declares one
    pub fn capped(mut self, max_steps: Option<u32>) -> Self {
        if let Some(cap) = max_steps {
            self.steps.truncate(cap as usize);
        }
        self
    }
}

/// Pipeline phase of a runtime step record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Plan,
    Propose,
    Approve,
    Execute,
    Verify,
    Explain,
}

/// Runtime record of one pipeline phase, aggregated into the persisted
/// step's output blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub phase: AgentPhase,
    pub action: String,
    pub result: String,

    /// Present iff phase is Approve
    #[serde(default)]
    pub approved: Option<bool>,

    pub at_ms: i64,
    pub duration_ms: u64,
}

impl AgentStep {
    /// Record a phase result
    pub fn new(phase: AgentPhase, action: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            phase,
            action: action.into(),
            result: result.into(),
            approved: None,
            at_ms: chrono::Utc::now().timestamp_millis(),
            duration_ms: 0,
        }
    }

    /// Record an approval decision
    pub fn approval(action: impl Into<String>, approved: bool) -> Self {
        Self {
            approved: Some(approved),
            ..Self::new(AgentPhase::Approve, action, if approved { "approved" } else { "denied" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_wire_shape_parses() {
        let json = serde_json::json!({
            "steps": [
                {"description": "list files", "primitive": "execution",
                 "args": {"tool": "list_directory", "tool_args": {"path": "src"}}, "reason": "see layout"}
            ],
            "tools": ["list_directory"],
            "estimatedRisk": "low"
        });

        let plan: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].primitive, "execution");
        assert_eq!(plan.estimated_risk, RiskLevel::Low);
    }

    #[test]
    fn test_aggregate_risk_is_max() {
        let plan = Plan {
            steps: vec![
                PlanStep {
                    description: "a".into(),
                    primitive: "execution".into(),
                    args: Value::Null,
                    reason: None,
                    risk: RiskLevel::Low,
                },
                PlanStep {
                    description: "b".into(),
                    primitive: "multi_edit".into(),
                    args: Value::Null,
                    reason: None,
                    risk: RiskLevel::High,
                },
            ],
            tools: vec![],
            estimated_risk: RiskLevel::Medium,
        };

        assert_eq!(plan.aggregate_risk(), RiskLevel::High);
    }

    #[test]
    fn test_plan_capping() {
        let steps = (0..5)
            .map(|i| PlanStep {
                description: format!("step {i}"),
                primitive: "execution".into(),
                args: Value::Null,
                reason: None,
                risk: RiskLevel::Low,
            })
            .collect();
        let plan = Plan {
            steps,
            tools: vec![],
            estimated_risk: RiskLevel::Low,
        };

        assert_eq!(plan.capped(Some(2)).steps.len(), 2);
    }

    #[test]
    fn test_agent_step_approval() {
        let step = AgentStep::approval("write foo.ts", true);
        assert_eq!(step.phase, AgentPhase::Approve);
        assert_eq!(step.approved, Some(true));
        assert_eq!(step.result, "approved");
    }
}
