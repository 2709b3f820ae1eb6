//! Prompt templates
//!
//! Handlebars templates for the planner, reviewer, and autonomous loop. The
//! registry is built once and shared.

use std::collections::BTreeMap;

use eyre::Result;
use handlebars::Handlebars;
use tracing::debug;

/// Planner system prompt: demands a single JSON object in the reply
pub const PLANNER_TEMPLATE: &str = "\
You are a planning assistant for a developer agent.

Break the task into an ordered list of steps. Each step names one primitive
from this set: {{primitives}}.
Available tools for execution steps: {{tools}}.

Respond with ONLY one JSON object, no prose, in exactly this shape:
{\"steps\": [{\"description\": \"...\", \"primitive\": \"...\", \"args\": {}, \"reason\": \"...\"}],
 \"tools\": [\"...\"],
 \"estimatedRisk\": \"low|medium|high|critical\"}

Task: {{task}}";

/// Review prompt: verify and explain an execution
pub const REVIEW_TEMPLATE: &str = "\
You are reviewing the execution of a developer task.

Task: {{task}}

Step results:
{{results}}

Reply with ONLY one JSON object:
{\"verified\": true|false, \"explanation\": \"...\"}";

/// Autonomous loop iteration prompt
pub const ITERATION_TEMPLATE: &str = "\
You are an autonomous developer agent working on a task.

Task: {{task}}
Iteration: {{iteration}}
{{#if history}}
Previous iterations:
{{history}}
{{/if}}
{{#if session}}
Session history:
{{session}}
{{/if}}
{{#if project}}
Project context:
{{project}}
{{/if}}

Work on the task. When the task is fully complete, include the exact marker
{{completion_signal}} in your reply and summarize what was done.";

/// Short-title prompt
pub const TITLE_TEMPLATE: &str = "\
Generate a 3-5 word title for this content. Output ONLY the title, nothing
else. Use lowercase words separated by hyphens. Example: oauth-database-schema

{{content}}";

/// Prompt registry with the embedded templates registered
pub struct PromptRegistry {
    handlebars: Handlebars<'static>,
}

impl PromptRegistry {
    /// Build the registry
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_template_string("planner", PLANNER_TEMPLATE)?;
        handlebars.register_template_string("review", REVIEW_TEMPLATE)?;
        handlebars.register_template_string("iteration", ITERATION_TEMPLATE)?;
        handlebars.register_template_string("title", TITLE_TEMPLATE)?;
        Ok(Self { handlebars })
    }

    /// Render a named template with string values
    pub fn render(&self, name: &str, values: &BTreeMap<&str, String>) -> Result<String> {
        debug!(template = %name, keys = values.len(), "render: called");
        Ok(self.handlebars.render(name, values)?)
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new().expect("embedded templates are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&'static str, &str)]) -> BTreeMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_planner_template_renders() {
        let registry = PromptRegistry::new().unwrap();
        let rendered = registry
            .render(
                "planner",
                &values(&[
                    ("task", "list files in src/"),
                    ("primitives", "planning, execution"),
                    ("tools", "list_directory, read_file"),
                ]),
            )
            .unwrap();

        assert!(rendered.contains("list files in src/"));
        assert!(rendered.contains("estimatedRisk"));
        assert!(rendered.contains("list_directory"));
    }

    #[test]
    fn test_iteration_template_conditionals() {
        let registry = PromptRegistry::new().unwrap();

        let bare = registry
            .render(
                "iteration",
                &values(&[
                    ("task", "do things"),
                    ("iteration", "1"),
                    ("completion_signal", "TASK_COMPLETE"),
                ]),
            )
            .unwrap();
        assert!(!bare.contains("Previous iterations"));
        assert!(bare.contains("TASK_COMPLETE"));

        let with_history = registry
            .render(
                "iteration",
                &values(&[
                    ("task", "do things"),
                    ("iteration", "2"),
                    ("history", "iteration 1: did stuff"),
                    ("completion_signal", "TASK_COMPLETE"),
                ]),
            )
            .unwrap();
        assert!(with_history.contains("Previous iterations"));
        assert!(with_history.contains("did stuff"));
    }

    #[test]
    fn test_no_html_escaping() {
        let registry = PromptRegistry::new().unwrap();
        let rendered = registry
            .render(
                "title",
                &values(&[("content", "a < b && c > d")]),
            )
            .unwrap();
        assert!(rendered.contains("a < b && c > d"));
    }
}
