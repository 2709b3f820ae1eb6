//! Planning primitive
//!
//! Asks the router for a structured plan, extracts the first balanced JSON
//! object from the reply, and validates every step against the registered
//! primitive set.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{Plan, Task};
use crate::llm::ChatRequest;

use super::{Primitive, PrimitiveContext, PrimitiveError};

/// Extract the first balanced JSON object from free-form model output.
/// Braces inside string literals are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Produce and validate a plan for a task
pub async fn plan_task(ctx: &PrimitiveContext, task: &Task) -> Result<Plan, PrimitiveError> {
    debug!(run_id = %ctx.run_id, task = %task.description, "plan_task: called");

    let mut values: BTreeMap<&str, String> = BTreeMap::new();
    values.insert("task", task.description.clone());
    values.insert("primitives", Primitive::names());
    values.insert("tools", ctx.tools.list(None).join(", "));

    let prompt = ctx
        .prompts
        .render("planner", &values)
        .map_err(|e| PrimitiveError::Validation(e.to_string()))?;

    let response = ctx
        .router
        .chat(ChatRequest::prompt(prompt, &task.description, ctx.max_tokens))
        .await?;

    let text = response.text();
    let json = extract_json_object(text)
        .ok_or_else(|| PrimitiveError::Validation(format!("no JSON object in planner reply: {text}")))?;

    let plan: Plan = serde_json::from_str(json)
        .map_err(|e| PrimitiveError::Validation(format!("planner JSON did not match the plan shape: {e}")))?;

    if plan.steps.is_empty() {
        return Err(PrimitiveError::Validation("planner produced an empty plan".to_string()));
    }

    for step in &plan.steps {
        if Primitive::from_name(&step.primitive).is_none() {
            return Err(PrimitiveError::Validation(format!(
                "plan step names unknown primitive '{}'",
                step.primitive
            )));
        }
    }

    let plan = plan.capped(task.max_steps);
    info!(steps = plan.steps.len(), risk = %plan.aggregate_risk(), "Plan accepted");
    Ok(plan)
}

/// Primitive entry point: input `{"task": "..."}`
pub async fn run(ctx: &PrimitiveContext, input: Value) -> Result<Value, PrimitiveError> {
    let Some(description) = input["task"].as_str() else {
        return Err(PrimitiveError::Validation("task is required".to_string()));
    };

    let task = Task::new(description);
    let plan = plan_task(ctx, &task).await?;
    Ok(serde_json::to_value(plan).map_err(|e| PrimitiveError::Validation(e.to_string()))?)
}
