//! ToolExecutor - the tool registry and invocation state machine
//!
//! Each call runs through: validated → policy-checked → {denied | approved |
//! auto} → running → {success | failed}. A denied call produces a failed
//! ToolResult with the policy reason and no side effects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{ToolCall, ToolDefinition};

use super::context::ToolContext;
use super::policy::{ApprovalGate, ApprovalMode, StaticGate};
use super::traits::{RiskLevel, Tool, ToolCategory, ToolResult};

/// Approval policy applied per invocation
#[derive(Clone)]
pub struct ApprovalPolicy {
    /// Task-level mode
    pub mode: ApprovalMode,

    /// Risk at or below which invocations auto-approve in prompt mode
    pub auto_threshold: RiskLevel,

    /// Consent gate used in prompt mode
    pub gate: Arc<dyn ApprovalGate>,
}

impl ApprovalPolicy {
    /// Auto-approve everything
    pub fn auto() -> Self {
        Self {
            mode: ApprovalMode::Auto,
            auto_threshold: RiskLevel::Medium,
            gate: Arc::new(StaticGate(true)),
        }
    }

    /// Deny everything that needs approval
    pub fn never() -> Self {
        Self {
            mode: ApprovalMode::Never,
            auto_threshold: RiskLevel::Medium,
            gate: Arc::new(StaticGate(false)),
        }
    }

    /// Prompt through the given gate for risky operations
    pub fn prompt(gate: Arc<dyn ApprovalGate>) -> Self {
        Self {
            mode: ApprovalMode::Prompt,
            auto_threshold: RiskLevel::Medium,
            gate,
        }
    }
}

/// Manages the tool catalogue and mediates invocation
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
    approval: ApprovalPolicy,
}

impl ToolExecutor {
    /// Create an empty executor with auto approval (tests)
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            approval: ApprovalPolicy::auto(),
        }
    }

    /// Create an executor with the standard tool set
    pub fn standard() -> Self {
        let mut executor = Self::empty();
        for tool in super::builtin::standard_tools() {
            executor.register(tool);
        }
        executor
    }

    /// Override the approval policy
    pub fn with_approval(mut self, approval: ApprovalPolicy) -> Self {
        self.approval = approval;
        self
    }

    /// Register a tool
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        debug!(tool = %tool.name(), "register: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names, optionally filtered by category
    pub fn list(&self, category: Option<ToolCategory>) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .tools
            .values()
            .filter(|t| category.map(|c| t.category() == c).unwrap_or(true))
            .map(|t| t.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Definitions for the LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Definitions for a named subset
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Execute a named tool through the full state machine
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        debug!(tool = %name, run_id = %ctx.run_id, "execute: called");
        let started = Instant::now();

        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(format!("Unknown tool: {name}"));
        };

        // validated
        if let Err(reason) = validate_input(&tool.input_schema(), &args) {
            debug!(tool = %name, %reason, "execute: validation failed");
            return finish(ToolResult::error(format!("Invalid arguments: {reason}")), started);
        }

        // policy-checked → denied | approved | auto
        let policy = ctx.approval.as_ref().unwrap_or(&self.approval);
        if !approve(policy, tool.as_ref(), &args).await {
            debug!(tool = %name, "execute: denied by policy");
            return finish(
                ToolResult::error(format!(
                    "Approval denied for '{}' (risk: {}, mode: {:?})",
                    name,
                    tool.risk(),
                    policy.mode
                )),
                started,
            );
        }

        // running → success | failed, under the per-tool deadline
        let deadline = ctx.limits.command_timeout;
        let result = match tokio::time::timeout(deadline, tool.execute(args, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %name, ?deadline, "execute: tool deadline exceeded");
                ToolResult::error(format!("Tool '{name}' timed out after {deadline:?}"))
            }
        };

        finish(result, started)
    }

    /// Execute a batch of LLM tool calls in order
    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        debug!(count = tool_calls.len(), "execute_all: called");
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let result = self.execute(&call.name, call.input.clone(), ctx).await;
            results.push((call.id.clone(), result));
        }
        results
    }

}

async fn approve(policy: &ApprovalPolicy, tool: &dyn Tool, args: &Value) -> bool {
    let needs_consent = tool.requires_approval() || tool.risk() > policy.auto_threshold;

    match policy.mode {
        ApprovalMode::Auto => true,
        ApprovalMode::Never => !needs_consent,
        ApprovalMode::Prompt => {
            if !needs_consent {
                return true;
            }
            let summary = format!("Run tool '{}'", tool.name());
            let details = vec![format!("args: {args}")];
            policy.gate.confirm(&summary, &details, tool.risk()).await
        }
    }
}

fn finish(mut result: ToolResult, started: Instant) -> ToolResult {
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

/// Minimal structural validation of args against a JSON schema: required
/// fields must be present, and declared property types must match.
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    let Some(object) = input.as_object() else {
        return Err("input must be an object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if !object.contains_key(name) {
                return Err(format!("missing required field '{name}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, value) in object {
            let Some(spec) = props.get(name) else {
                return Err(format!("unexpected field '{name}'"));
            };
            let Some(expected) = spec.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(format!("field '{name}' should be {expected}"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EchoTool {
        risk: RiskLevel,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &'static str {
            "Echo the message back"
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Analysis
        }
        fn risk(&self) -> RiskLevel {
            self.risk
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }
        async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(input["message"].as_str().unwrap_or_default().to_string())
        }
    }

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(dir.to_path_buf(), "run-1")
    }

    #[tokio::test]
    async fn test_execute_success() {
        let temp = tempdir().unwrap();
        let mut executor = ToolExecutor::empty();
        executor.register(Box::new(EchoTool { risk: RiskLevel::Low }));

        let result = executor
            .execute("echo", serde_json::json!({"message": "hi"}), &ctx(temp.path()))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let temp = tempdir().unwrap();
        let executor = ToolExecutor::empty();

        let result = executor.execute("nope", serde_json::json!({}), &ctx(temp.path())).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_validation_rejects_missing_and_extra_fields() {
        let temp = tempdir().unwrap();
        let mut executor = ToolExecutor::empty();
        executor.register(Box::new(EchoTool { risk: RiskLevel::Low }));

        let missing = executor.execute("echo", serde_json::json!({}), &ctx(temp.path())).await;
        assert!(!missing.success);
        assert!(missing.error.unwrap().contains("missing required field"));

        let extra = executor
            .execute("echo", serde_json::json!({"message": "x", "bogus": 1}), &ctx(temp.path()))
            .await;
        assert!(!extra.success);

        let wrong_type = executor
            .execute("echo", serde_json::json!({"message": 42}), &ctx(temp.path()))
            .await;
        assert!(!wrong_type.success);
    }

    #[tokio::test]
    async fn test_never_mode_denies_high_risk() {
        let temp = tempdir().unwrap();
        let mut executor = ToolExecutor::empty().with_approval(ApprovalPolicy::never());
        executor.register(Box::new(EchoTool { risk: RiskLevel::High }));

        let result = executor
            .execute("echo", serde_json::json!({"message": "hi"}), &ctx(temp.path()))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Approval denied"));
    }

    #[tokio::test]
    async fn test_never_mode_allows_low_risk() {
        let temp = tempdir().unwrap();
        let mut executor = ToolExecutor::empty().with_approval(ApprovalPolicy::never());
        executor.register(Box::new(EchoTool { risk: RiskLevel::Low }));

        let result = executor
            .execute("echo", serde_json::json!({"message": "hi"}), &ctx(temp.path()))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_prompt_mode_consults_gate() {
        let temp = tempdir().unwrap();
        let mut executor =
            ToolExecutor::empty().with_approval(ApprovalPolicy::prompt(Arc::new(StaticGate(false))));
        executor.register(Box::new(EchoTool { risk: RiskLevel::High }));

        let result = executor
            .execute("echo", serde_json::json!({"message": "hi"}), &ctx(temp.path()))
            .await;
        assert!(!result.success);

        let mut approving =
            ToolExecutor::empty().with_approval(ApprovalPolicy::prompt(Arc::new(StaticGate(true))));
        approving.register(Box::new(EchoTool { risk: RiskLevel::High }));
        let result = approving
            .execute("echo", serde_json::json!({"message": "hi"}), &ctx(temp.path()))
            .await;
        assert!(result.success);
    }

    #[test]
    fn test_standard_executor_catalogue() {
        let executor = ToolExecutor::standard();

        for expected in ["read_file", "write_file", "edit_file", "list_directory", "glob", "grep", "run_command"] {
            assert!(executor.has_tool(expected), "missing {expected}");
        }

        let fs_tools = executor.list(Some(ToolCategory::Filesystem));
        assert!(fs_tools.contains(&"read_file"));
        assert!(!fs_tools.contains(&"run_command"));
    }
}
