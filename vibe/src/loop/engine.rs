//! Autonomous loop engine
//!
//! Iterates the LLM executor against a task until a completion signal is
//! detected, a stuck condition is detected, the iteration or duration budget
//! runs out, or the loop's own circuit breaker opens.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::LoopSection;
use crate::llm::{CircuitBreaker, CircuitState, RateLimiter, TokenUsage};
use crate::primitives::{PrimitiveContext, PrimitiveError, run_agentic_loop};

use super::analyzer::{AnalyzerConfig, DEFAULT_COMPLETION_SIGNAL, ResponseAnalyzer};
use super::session::{IterationRecord, Session, SessionStatus};

/// Loop configuration
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub max_duration: Duration,
    pub rate_limit_per_hour: usize,
    pub analyzer: AnalyzerConfig,
    pub enable_circuit_breaker: bool,
    pub circuit_failure_threshold: u32,
    pub circuit_reset: Duration,
    pub max_retries: u32,
    pub max_turns_per_iteration: u32,
    /// Recent iteration summaries injected into the prompt
    pub history_keep: usize,
    /// Truncation for each injected summary
    pub summary_chars: usize,
    /// Truncation for the injected session history
    pub session_history_chars: usize,
    /// Pause between iterations
    pub iteration_delay: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_duration: Duration::from_secs(60 * 60),
            rate_limit_per_hour: 100,
            analyzer: AnalyzerConfig::default(),
            enable_circuit_breaker: true,
            circuit_failure_threshold: 3,
            circuit_reset: Duration::from_secs(60),
            max_retries: 3,
            max_turns_per_iteration: 10,
            history_keep: 5,
            summary_chars: 500,
            session_history_chars: 2000,
            iteration_delay: Duration::from_millis(500),
        }
    }
}

impl From<&LoopSection> for LoopConfig {
    fn from(section: &LoopSection) -> Self {
        Self {
            max_iterations: section.max_iterations,
            max_duration: Duration::from_millis(section.max_duration_ms),
            rate_limit_per_hour: section.rate_limit_per_hour,
            analyzer: AnalyzerConfig {
                confidence_threshold: section.confidence_threshold,
                stuck_threshold: section.stuck_threshold,
                ..AnalyzerConfig::default()
            },
            enable_circuit_breaker: section.enable_circuit_breaker,
            max_retries: section.max_retries,
            ..Self::default()
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Complete,
    Stuck,
    Budget,
    Circuit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Stuck => write!(f, "stuck"),
            Self::Budget => write!(f, "budget"),
            Self::Circuit => write!(f, "circuit"),
        }
    }
}

/// Terminal result of one loop invocation
#[derive(Debug)]
pub struct LoopResult {
    pub reason: ExitReason,
    pub iterations: u32,
    pub success: bool,
    pub usage: TokenUsage,
    pub session_id: String,
}

/// Running statistics snapshot
#[derive(Debug, Clone)]
pub struct LoopStats {
    pub iterations: u32,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub elapsed: Duration,
}

/// The loop engine
pub struct LoopEngine {
    ctx: PrimitiveContext,
    config: LoopConfig,
    analyzer: ResponseAnalyzer,
    /// Loop-level breaker, independent of the router's per-provider breakers
    circuit: CircuitBreaker,
    limiter: RateLimiter,
    session: Session,
    sessions_dir: PathBuf,
    project_context: Option<String>,
    iteration: u32,
    usage: TokenUsage,
    started: Option<Instant>,
}

impl LoopEngine {
    /// Create an engine for one task
    pub fn new(ctx: PrimitiveContext, config: LoopConfig, sessions_dir: PathBuf, task: impl Into<String>) -> Self {
        let task = task.into();
        debug!(task = %task, max_iterations = config.max_iterations, "LoopEngine::new: called");
        Self {
            analyzer: ResponseAnalyzer::new(config.analyzer.clone()),
            circuit: CircuitBreaker::new(config.circuit_failure_threshold, config.circuit_reset),
            limiter: RateLimiter::new(config.rate_limit_per_hour, Duration::from_secs(3600)),
            session: Session::new(task),
            sessions_dir,
            project_context: None,
            iteration: 0,
            usage: TokenUsage::default(),
            started: None,
            ctx,
            config,
        }
    }

    /// Inject project context into every iteration prompt
    pub fn with_project_context(mut self, context: impl Into<String>) -> Self {
        self.project_context = Some(context.into());
        self
    }

    /// Current statistics
    pub fn stats(&self) -> LoopStats {
        LoopStats {
            iterations: self.iteration,
            usage: self.usage,
            cost_usd: self.ctx.router.usage().cost_usd,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        }
    }

    /// Session id for this loop
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Run until an exit condition fires. Always terminates within the
    /// iteration and duration budgets.
    pub async fn run(&mut self) -> eyre::Result<LoopResult> {
        let started = Instant::now();
        self.started = Some(started);
        info!(session = %self.session.id, task = %self.session.task, "Autonomous loop starting");

        let reason = loop {
            // Budgets first: both bounds are hard
            if self.iteration >= self.config.max_iterations {
                debug!("run: iteration budget exhausted");
                break ExitReason::Budget;
            }
            if started.elapsed() >= self.config.max_duration {
                debug!("run: duration budget exhausted");
                break ExitReason::Budget;
            }

            if self.config.enable_circuit_breaker && self.circuit.state() == CircuitState::Open {
                warn!(session = %self.session.id, "run: loop circuit open");
                break ExitReason::Circuit;
            }

            if !self.limiter.try_acquire() {
                debug!("run: hourly rate limit reached, pausing");
                tokio::time::sleep(Duration::from_millis(250)).await;
                continue;
            }

            self.iteration += 1;
            let iteration_started = Instant::now();
            info!(session = %self.session.id, iteration = self.iteration, "Loop iteration");

            match self.run_iteration().await {
                Ok(response) => {
                    self.circuit.record_success();
                    let analysis = self.analyzer.analyze(&response);

                    self.session.push(IterationRecord {
                        number: self.iteration,
                        response_summary: truncate(&response, self.config.summary_chars),
                        action_items: extract_action_items(&response),
                        completion: analysis.confidence,
                        duration_ms: iteration_started.elapsed().as_millis() as u64,
                        errors: vec![],
                    });
                    self.persist_session();

                    if analysis.completes(self.config.analyzer.confidence_threshold) {
                        info!(session = %self.session.id, iterations = self.iteration, "Loop complete");
                        break ExitReason::Complete;
                    }
                    if self.analyzer.is_stuck() {
                        warn!(session = %self.session.id, iterations = self.iteration, "Loop stuck");
                        break ExitReason::Stuck;
                    }
                }
                Err(e) => {
                    warn!(session = %self.session.id, iteration = self.iteration, error = %e, "Iteration failed");
                    self.circuit.record_failure();

                    self.session.push(IterationRecord {
                        number: self.iteration,
                        response_summary: String::new(),
                        action_items: vec![],
                        completion: 0.0,
                        duration_ms: iteration_started.elapsed().as_millis() as u64,
                        errors: vec![e.to_string()],
                    });
                    self.persist_session();
                }
            }

            if !self.config.iteration_delay.is_zero() {
                tokio::time::sleep(self.config.iteration_delay).await;
            }
        };

        let success = reason == ExitReason::Complete;
        self.session.set_status(if success {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        });
        self.persist_session();

        info!(session = %self.session.id, %reason, iterations = self.iteration, success, "Autonomous loop finished");
        Ok(LoopResult {
            reason,
            iterations: self.iteration,
            success,
            usage: self.usage,
            session_id: self.session.id.clone(),
        })
    }

    /// One iteration: compose the prompt, invoke the executor with retries,
    /// return the response text.
    async fn run_iteration(&mut self) -> Result<String, PrimitiveError> {
        let prompt = self.compose_prompt()?;
        debug!(iteration = self.iteration, prompt_len = prompt.len(), "run_iteration: prompt composed");

        let system_prompt = format!(
            "You are an autonomous developer agent. Working directory: {}",
            self.ctx.workspace.display()
        );
        let tool_defs = self.ctx.tools.definitions();

        let mut attempt = 0u32;
        loop {
            let result = run_agentic_loop(
                &self.ctx,
                &system_prompt,
                &prompt,
                tool_defs.clone(),
                self.config.max_turns_per_iteration,
            )
            .await;

            match result {
                Ok(outcome) => {
                    self.usage.add(&outcome.usage);
                    return Ok(outcome.text.unwrap_or_default());
                }
                Err(PrimitiveError::Router(e)) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = backoff_delay(attempt);
                    debug!(attempt, ?backoff, error = %e, "run_iteration: retrying after transient error");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn compose_prompt(&self) -> Result<String, PrimitiveError> {
        let mut values: BTreeMap<&str, String> = BTreeMap::new();
        values.insert("task", self.session.task.clone());
        values.insert("iteration", (self.iteration).to_string());
        values.insert("completion_signal", DEFAULT_COMPLETION_SIGNAL.to_string());

        let recent: Vec<&IterationRecord> = self
            .session
            .iterations
            .iter()
            .rev()
            .take(self.config.history_keep)
            .collect();
        if !recent.is_empty() {
            let mut lines: Vec<String> = recent
                .iter()
                .rev()
                .map(|r| format!("iteration {}: {}", r.number, truncate(&r.response_summary, self.config.summary_chars)))
                .collect();
            lines.dedup();
            values.insert("history", lines.join("\n"));
        }

        let session_history = self.session.history_text(self.config.session_history_chars);
        if !session_history.is_empty() {
            values.insert("session", session_history);
        }

        if let Some(project) = &self.project_context {
            values.insert("project", project.clone());
        }

        self.ctx
            .prompts
            .render("iteration", &values)
            .map_err(|e| PrimitiveError::Validation(e.to_string()))
    }

    fn persist_session(&self) {
        if let Err(e) = self.session.save(&self.sessions_dir) {
            warn!(session = %self.session.id, error = %e, "Failed to persist session");
        }
    }
}

/// Exponential backoff: 1s, 2s, 4s, capped at 10s, with jitter
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = (1000u64 << (attempt.saturating_sub(1))).min(10_000);
    let jitter = rand::rng().random_range(0..250);
    Duration::from_millis(base_ms + jitter)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() > max {
        format!("{}...", &text[..max])
    } else {
        text.to_string()
    }
}

/// Pull "- [ ]"-style and "TODO:" action items out of a response
fn extract_action_items(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("- [ ]") {
                Some(rest.trim().to_string())
            } else {
                trimmed.strip_prefix("TODO:").map(|rest| rest.trim().to_string())
            }
        })
        .filter(|item| !item.is_empty())
        .collect()
}
