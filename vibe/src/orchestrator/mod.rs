//! Orchestrator
//!
//! Executes a plan step by step: each step is persisted pending → running →
//! terminal before the next one starts, failures abort the remainder by
//! default, and the reviewer captures diagnostics afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use sessionstore::{RunRecord, RunStatus, StepRecord, StepStatus};

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::domain::{AgentPhase, AgentStep, Plan, Task};
use crate::llm::Router;
use crate::primitives::{self, Primitive, PrimitiveContext};
use crate::prompts::PromptRegistry;
use crate::state::StateManager;
use crate::tools::{ApprovalPolicy, RiskLevel, ToolExecutor};

/// Cooperative cancellation flag, checked at every suspension point between
/// steps
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to do when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure (default)
    #[default]
    Abort,
    /// Keep executing the remaining steps
    Continue,
}

/// One executed step, as reported to the caller
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_number: u32,
    pub primitive: String,
    pub description: String,
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Result of one end-to-end run
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub plan: Plan,
    pub steps: Vec<StepOutcome>,
    /// Runtime records of the plan/approve phases
    pub phases: Vec<AgentStep>,
    pub review: Option<Value>,
    pub checkpoint_id: Option<String>,
}

impl RunOutcome {
    /// True when every planned step succeeded
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// The orchestrator: owns the engine dependencies and executes tasks
pub struct Orchestrator {
    router: Arc<Router>,
    tools: Arc<ToolExecutor>,
    checkpoints: Arc<CheckpointStore>,
    state: StateManager,
    prompts: Arc<PromptRegistry>,
    config: Config,
    failure_policy: FailurePolicy,
    /// Risk at or above which the plan itself needs approval
    approval_risk_threshold: RiskLevel,
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit dependencies
    pub fn new(
        router: Arc<Router>,
        tools: Arc<ToolExecutor>,
        checkpoints: Arc<CheckpointStore>,
        state: StateManager,
        config: Config,
    ) -> Self {
        Self {
            router,
            tools,
            checkpoints,
            state,
            prompts: Arc::new(PromptRegistry::default()),
            config,
            failure_policy: FailurePolicy::default(),
            approval_risk_threshold: RiskLevel::Medium,
        }
    }

    /// Override the failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Session store handle
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Checkpoint store handle
    pub fn checkpoints(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    /// Execute a task end to end: plan, gate, run each step, review
    pub async fn run_task(
        &self,
        task: &Task,
        approval: ApprovalPolicy,
        cancel: CancelFlag,
    ) -> eyre::Result<RunOutcome> {
        let run = RunRecord::new(
            whoami(),
            self.config.workspace.display().to_string(),
            serde_json::to_value(&self.config)?,
        );
        let run_id = run.id.clone();
        info!(%run_id, task = %task.description, "Run accepted");

        self.state.create_run(&run).await?;
        self.state.update_run_status(&run_id, RunStatus::Running).await?;

        let ctx = PrimitiveContext {
            router: Arc::clone(&self.router),
            tools: Arc::clone(&self.tools),
            checkpoints: Arc::clone(&self.checkpoints),
            state: self.state.clone(),
            prompts: Arc::clone(&self.prompts),
            approval,
            workspace: self.config.workspace.clone(),
            run_id: run_id.clone(),
            session_id: run_id.clone(),
            determinism: self.config.determinism_mode(),
            max_tokens: self.config.router.max_tokens,
        };

        // Plan
        let mut phases = vec![];
        let plan = match primitives::plan_task(&ctx, task).await {
            Ok(plan) => plan,
            Err(e) => {
                self.state.update_run_status(&run_id, RunStatus::Failed).await?;
                return Err(eyre::eyre!("Planning failed ({}): {}", e.classification(), e));
            }
        };
        phases.push(AgentStep::new(
            AgentPhase::Plan,
            &task.description,
            format!("{} steps, risk {}", plan.steps.len(), plan.aggregate_risk()),
        ));

        // Gate the whole plan when its risk clears the threshold
        if plan.aggregate_risk() >= self.approval_risk_threshold {
            let step_lines: Vec<String> = plan.steps.iter().map(|s| s.description.clone()).collect();
            let approved =
                primitives::approval_decide(&ctx, &task.description, &step_lines, plan.aggregate_risk()).await;
            phases.push(AgentStep::approval(&task.description, approved));

            if !approved {
                warn!(%run_id, "Plan denied by approval policy");
                self.state.update_run_status(&run_id, RunStatus::Failed).await?;
                return Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Failed,
                    plan,
                    steps: vec![],
                    phases,
                    review: None,
                    checkpoint_id: None,
                });
            }
        }

        // Execute sequentially
        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(plan.steps.len());
        let mut aborted_by = None;

        for (n, plan_step) in plan.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(%run_id, step = n, "Run cancelled before step");
                self.state.update_run_status(&run_id, RunStatus::Cancelled).await?;
                return Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Cancelled,
                    plan,
                    steps: outcomes,
                    phases,
                    review: None,
                    checkpoint_id: None,
                });
            }

            let outcome = self.run_step(&ctx, &run_id, n as u32, plan_step).await?;
            let failed = !outcome.success;
            outcomes.push(outcome);

            if failed && self.failure_policy == FailurePolicy::Abort {
                aborted_by = Some(n);
                break;
            }
        }

        // Review: verify and explain, including the failure case
        let review = self.review(&ctx, task, &outcomes).await;
        if let Some(n) = aborted_by {
            debug!(%run_id, failed_step = n, "Plan aborted after failed step");
        }

        // Derived status: success iff every planned step succeeded
        let status = if outcomes.len() == plan.steps.len() && outcomes.iter().all(|o| o.success) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        self.state.update_run_status(&run_id, status).await?;

        // Optional completion checkpoint
        let checkpoint_id = if task.checkpoint_on_complete && status == RunStatus::Success {
            self.checkpoints
                .create_checkpoint(&run_id, Some(&format!("run-{run_id}")))
                .await?
                .map(|cp| cp.id)
        } else {
            None
        };

        info!(%run_id, %status, steps = outcomes.len(), "Run finished");
        Ok(RunOutcome {
            run_id,
            status,
            plan,
            steps: outcomes,
            phases,
            review,
            checkpoint_id,
        })
    }

    /// Execute one plan step with full persistence
    async fn run_step(
        &self,
        ctx: &PrimitiveContext,
        run_id: &str,
        step_number: u32,
        plan_step: &crate::domain::PlanStep,
    ) -> eyre::Result<StepOutcome> {
        debug!(%run_id, step_number, primitive = %plan_step.primitive, "run_step: called");

        let record = StepRecord::new(
            run_id,
            step_number,
            &plan_step.primitive,
            &plan_step.description,
            plan_step.args.clone(),
        );
        self.state.create_step(&record).await?;
        self.state.update_step_status(&record.id, StepStatus::Running).await?;

        let started = Instant::now();
        let primitive = Primitive::from_name(&plan_step.primitive)
            .ok_or_else(|| eyre::eyre!("plan step names unknown primitive '{}'", plan_step.primitive))?;

        let result = primitives::execute(primitive, ctx, plan_step.args.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (success, output, error) = match result {
            // A primitive can report a tool-level failure in-band
            Ok(output) => {
                let success = output.get("success").and_then(|v| v.as_bool()).unwrap_or(true);
                let error = if success {
                    None
                } else {
                    let message = output
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("tool failed")
                        .to_string();
                    let class = if message.contains("denied") || message.contains("blocked") || message.contains("escapes") {
                        "permission"
                    } else if message.contains("not found") || message.contains("No such file") {
                        "not_found"
                    } else if message.contains("timed out") {
                        "timeout"
                    } else {
                        "internal"
                    };
                    Some(format!("{class}: {message}"))
                };
                (success, output, error)
            }
            Err(e) => {
                let tag = format!("{}: {e}", e.classification());
                if e.is_fatal() {
                    warn!(%run_id, step_number, %tag, "run_step: fatal primitive error");
                } else {
                    debug!(%run_id, step_number, %tag, "run_step: primitive failed");
                }
                (false, Value::Null, Some(tag))
            }
        };

        // Aggregate the runtime phase record into the persisted output blob
        let execute_phase = AgentStep::new(
            AgentPhase::Execute,
            &plan_step.description,
            if success { "success" } else { "failed" },
        );
        let blob = serde_json::json!({
            "result": output,
            "phases": [execute_phase],
        });

        let status = if success { StepStatus::Success } else { StepStatus::Failed };
        self.state
            .update_step_result(&record.id, &blob, status, error.as_deref(), duration_ms as i64)
            .await?;

        Ok(StepOutcome {
            step_number,
            primitive: plan_step.primitive.clone(),
            description: plan_step.description.clone(),
            success,
            output,
            error,
            duration_ms,
        })
    }

    async fn review(&self, ctx: &PrimitiveContext, task: &Task, outcomes: &[StepOutcome]) -> Option<Value> {
        if outcomes.is_empty() {
            return None;
        }

        let results: Vec<Value> = outcomes
            .iter()
            .map(|o| {
                serde_json::json!({
                    "step": o.step_number,
                    "primitive": o.primitive,
                    "success": o.success,
                    "error": o.error,
                })
            })
            .collect();

        match primitives::execute(
            Primitive::Review,
            ctx,
            serde_json::json!({ "task": task.description, "results": results }),
        )
        .await
        {
            Ok(review) => Some(review),
            Err(e) => {
                debug!(error = %e, "review: reviewer unavailable");
                None
            }
        }
    }
}

fn whoami() -> String {
    std::env::var("USER").or_else(|_| std::env::var("USERNAME")).unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockOutcome, MockProvider, response_with};
    use crate::llm::RouterConfig;
    use tempfile::tempdir;

    fn plan_reply(steps: &str) -> String {
        format!(r#"{{"steps": [{steps}], "tools": [], "estimatedRisk": "low"}}"#)
    }

    async fn orchestrator_with(replies: Vec<String>, workspace: &std::path::Path) -> Orchestrator {
        let outcomes = replies
            .into_iter()
            .map(|text| MockOutcome::Ok(response_with("mock", &text)))
            .collect();
        let router = Arc::new(Router::with_providers(
            RouterConfig {
                default_provider: "mock".to_string(),
                fallbacks: vec![],
                ..Default::default()
            },
            vec![Arc::new(MockProvider::new("mock", outcomes))],
        ));

        let config = Config {
            workspace: workspace.to_path_buf(),
            ..Default::default()
        };

        Orchestrator::new(
            router,
            Arc::new(ToolExecutor::standard()),
            Arc::new(CheckpointStore::open(workspace.join(".vibe")).unwrap()),
            StateManager::in_memory().unwrap(),
            config,
        )
    }

    #[tokio::test]
    async fn test_trivial_plan_runs_to_success() {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/lib.rs"), "pub fn f() {}").unwrap();

        let orchestrator = orchestrator_with(
            vec![
                plan_reply(
                    r#"{"description": "list the files in src/", "primitive": "execution",
                        "args": {"tool": "list_directory", "tool_args": {"path": "src"}}}"#,
                ),
                r#"{"verified": true, "explanation": "listing returned"}"#.to_string(),
            ],
            temp.path(),
        )
        .await;

        let task = Task::new("list the files in src/");
        let outcome = orchestrator
            .run_task(&task, ApprovalPolicy::auto(), CancelFlag::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.steps.len(), 1);
        assert!(outcome.steps[0].output["output"].as_str().unwrap().contains("lib.rs"));
        assert!(outcome.checkpoint_id.is_none());

        // Plan→step correspondence in the store
        let steps = orchestrator.state().steps_for_run(&outcome.run_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].primitive, "execution");
        assert_eq!(steps[0].status, sessionstore::StepStatus::Success);

        let run = orchestrator.state().get_run(&outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_step_failure_aborts_remainder() {
        let temp = tempdir().unwrap();

        let orchestrator = orchestrator_with(
            vec![
                plan_reply(
                    r#"{"description": "read missing", "primitive": "execution",
                        "args": {"tool": "read_file", "tool_args": {"path": "missing.txt"}}},
                       {"description": "never runs", "primitive": "execution",
                        "args": {"tool": "list_directory", "tool_args": {"path": "."}}}"#,
                ),
                r#"{"verified": false, "explanation": "first step failed"}"#.to_string(),
            ],
            temp.path(),
        )
        .await;

        let task = Task::new("do two things");
        let outcome = orchestrator
            .run_task(&task, ApprovalPolicy::auto(), CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.steps.len(), 1);
        assert!(!outcome.steps[0].success);

        // Only the attempted step is persisted; the run is failed
        let steps = orchestrator.state().steps_for_run(&outcome.run_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, sessionstore::StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_risky_plan_denied_in_never_mode() {
        let temp = tempdir().unwrap();

        let orchestrator = orchestrator_with(
            vec![format!(
                r#"{{"steps": [{{"description": "overwrite config", "primitive": "execution",
                    "args": {{"tool": "write_file", "tool_args": {{"path": "a", "content": "b"}}}}, "risk": "high"}}],
                  "tools": [], "estimatedRisk": "high"}}"#
            )],
            temp.path(),
        )
        .await;

        let task = Task::new("overwrite config");
        let outcome = orchestrator
            .run_task(&task, ApprovalPolicy::never(), CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.steps.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_before_first_step() {
        let temp = tempdir().unwrap();

        let orchestrator = orchestrator_with(
            vec![plan_reply(
                r#"{"description": "list", "primitive": "execution",
                    "args": {"tool": "list_directory", "tool_args": {"path": "."}}}"#,
            )],
            temp.path(),
        )
        .await;

        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = orchestrator
            .run_task(&Task::new("anything"), ApprovalPolicy::auto(), cancel)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(outcome.steps.is_empty());

        let run = orchestrator.state().get_run(&outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_checkpoint_on_complete() {
        let temp = tempdir().unwrap();

        let orchestrator = orchestrator_with(
            vec![
                plan_reply(
                    r#"{"description": "write note", "primitive": "execution",
                        "args": {"tool": "write_file", "tool_args": {"path": "note.txt", "content": "hi"}}}"#,
                ),
                r#"{"verified": true, "explanation": "written"}"#.to_string(),
            ],
            temp.path(),
        )
        .await;

        let mut task = Task::new("write a note");
        task.checkpoint_on_complete = true;

        let outcome = orchestrator
            .run_task(&task, ApprovalPolicy::auto(), CancelFlag::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        let checkpoint_id = outcome.checkpoint_id.expect("checkpoint should exist");

        // Rolling the checkpoint back removes the written file
        orchestrator.checkpoints().rollback(&checkpoint_id).await.unwrap();
        assert!(!temp.path().join("note.txt").exists());
    }
}
