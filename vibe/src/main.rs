use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;

use vibe::cli::{CheckpointAction, Cli, Command, ConfigAction, ContextAction};
use vibe::config::{Config, setup_logging};
use vibe::llm::{ChatRequest, Router, StreamChunk};
use vibe::orchestrator::{CancelFlag, Orchestrator};
use vibe::primitives::PrimitiveContext;
use vibe::r#loop::{LoopConfig, LoopEngine};
use vibe::tools::{ApprovalGate, ApprovalPolicy, ApprovalMode, RiskLevel, ToolExecutor};
use vibe::{CheckpointStore, PromptRegistry, StateManager, Task};

/// Console approval gate: prints the proposal and reads y/n
struct ConsoleGate;

#[async_trait]
impl ApprovalGate for ConsoleGate {
    async fn confirm(&self, summary: &str, details: &[String], risk: RiskLevel) -> bool {
        println!("{} {} (risk: {})", "approve?".yellow().bold(), summary, risk);
        for line in details {
            println!("  - {line}");
        }
        print!("Proceed? [y/N] ");
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn approval_policy(mode: &str) -> Result<ApprovalPolicy> {
    let mode: ApprovalMode = mode.parse().map_err(|e: String| eyre::eyre!(e))?;
    Ok(match mode {
        ApprovalMode::Auto => ApprovalPolicy::auto(),
        ApprovalMode::Never => ApprovalPolicy::never(),
        ApprovalMode::Prompt => ApprovalPolicy::prompt(Arc::new(ConsoleGate)),
    })
}

struct EngineParts {
    router: Arc<Router>,
    tools: Arc<ToolExecutor>,
    checkpoints: Arc<CheckpointStore>,
    state: StateManager,
    config: Config,
}

fn build_parts(config: Config) -> Result<EngineParts> {
    let state_dir = config.state_dir();
    Ok(EngineParts {
        router: Arc::new(Router::new(config.router_config())),
        tools: Arc::new(ToolExecutor::standard()),
        checkpoints: Arc::new(CheckpointStore::open(&state_dir).context("Failed to open checkpoint store")?),
        state: StateManager::open(&state_dir).context("Failed to open session store")?,
        config,
    })
}

fn orchestrator_from(parts: &EngineParts) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(&parts.router),
        Arc::clone(&parts.tools),
        Arc::clone(&parts.checkpoints),
        parts.state.clone(),
        parts.config.clone(),
    )
}

fn status_colored(status: &str) -> ColoredString {
    match status {
        "success" => status.green(),
        "failed" => status.red(),
        "running" => status.yellow(),
        _ => status.normal(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(workspace) = cli.workspace {
        config.workspace = workspace;
    }

    info!(workspace = %config.workspace.display(), "vibe starting");

    match cli.command {
        Command::Run {
            task,
            approval,
            max_steps,
            checkpoint,
        } => {
            let parts = build_parts(config)?;
            let orchestrator = orchestrator_from(&parts);

            let mut task = Task::new(task);
            task.max_steps = max_steps;
            task.checkpoint_on_complete = checkpoint;
            task.approval_mode = approval.parse().map_err(|e: String| eyre::eyre!(e))?;

            let outcome = orchestrator
                .run_task(&task, approval_policy(&approval)?, CancelFlag::new())
                .await?;

            if cli.json {
                let steps: Vec<serde_json::Value> = outcome
                    .steps
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "step": s.step_number,
                            "primitive": s.primitive,
                            "success": s.success,
                            "error": s.error,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "run_id": outcome.run_id,
                        "status": outcome.status.to_string(),
                        "steps": steps,
                        "checkpoint": outcome.checkpoint_id,
                    })
                );
            } else {
                println!("run {} {}", outcome.run_id.cyan(), status_colored(&outcome.status.to_string()));
                for step in &outcome.steps {
                    let mark = if step.success { "✓".green() } else { "✗".red() };
                    println!("  {} {} {} ({}ms)", mark, step.primitive.yellow(), step.description, step.duration_ms);
                    if let Some(error) = &step.error {
                        println!("    {}", error.red());
                    }
                }
                if let Some(review) = &outcome.review
                    && let Some(explanation) = review["explanation"].as_str()
                {
                    println!("{} {}", "review:".bold(), explanation);
                }
                if let Some(id) = &outcome.checkpoint_id {
                    println!("{} {}", "checkpoint:".bold(), id);
                }
            }

            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Command::Autonomous {
            task,
            max_loops,
            max_duration,
            rate_limit,
        } => {
            let parts = build_parts(config)?;
            let sessions_dir = parts.config.state_dir().join("sessions");

            let ctx = PrimitiveContext {
                router: Arc::clone(&parts.router),
                tools: Arc::clone(&parts.tools),
                checkpoints: Arc::clone(&parts.checkpoints),
                state: parts.state.clone(),
                prompts: Arc::new(PromptRegistry::default()),
                approval: ApprovalPolicy::auto(),
                workspace: parts.config.workspace.clone(),
                run_id: format!("loop-{}", chrono::Utc::now().timestamp_millis()),
                session_id: String::new(),
                determinism: parts.config.determinism_mode(),
                max_tokens: parts.config.router.max_tokens,
            };

            let mut loop_config = LoopConfig::from(&parts.config.r#loop);
            loop_config.max_iterations = max_loops;
            loop_config.max_duration = std::time::Duration::from_secs(max_duration * 60);
            loop_config.rate_limit_per_hour = rate_limit;

            // Context selection feeds the iteration prompt: relevant files
            // and why they matched
            let project_context = {
                let workspace = parts.config.workspace.clone();
                let query = task.clone();
                let max_tokens = parts.config.context.max_tokens;
                tokio::task::spawn_blocking(move || {
                    let mut manager = contextkit::ContextManager::open(&workspace).ok()?;
                    let selection = manager
                        .select_relevant_files(&contextkit::SelectRequest {
                            query,
                            max_tokens,
                            ..Default::default()
                        })
                        .ok()?;
                    if selection.files.is_empty() {
                        None
                    } else {
                        let lines: Vec<String> = selection
                            .files
                            .iter()
                            .map(|f| format!("{} ({})", f.path.display(), f.match_reasons.join(", ")))
                            .collect();
                        Some(format!("Relevant files:\n{}", lines.join("\n")))
                    }
                })
                .await
                .ok()
                .flatten()
            };

            let mut engine = LoopEngine::new(ctx, loop_config, sessions_dir, &task);
            if let Some(context) = project_context {
                engine = engine.with_project_context(context);
            }
            let result = engine.run().await?;
            let stats = engine.stats();

            println!(
                "{} after {} iterations (reason: {}, {} tokens, ${:.4})",
                if result.success { "complete".green() } else { "stopped".red() },
                result.iterations,
                result.reason,
                stats.usage.total(),
                stats.cost_usd
            );
            println!("session: {}", result.session_id.cyan());

            if !result.success {
                std::process::exit(1);
            }
        }

        Command::Chat { prompt, stream, model } => {
            let parts = build_parts(config)?;
            let mut request = ChatRequest::prompt("You are a helpful assistant.", &prompt, parts.config.router.max_tokens);
            request.model = model;

            if stream {
                let (tx, mut rx) = tokio::sync::mpsc::channel(64);
                let printer = tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        if let StreamChunk::TextDelta(delta) = chunk {
                            print!("{delta}");
                            let _ = std::io::stdout().flush();
                        }
                    }
                });
                let response = parts.router.stream(request, tx).await?;
                let _ = printer.await;
                println!();
                eprintln!("[{} / {} tokens / ${:.4}]", response.provider, response.usage.total(), response.cost_usd);
            } else {
                let response = parts.router.chat(request).await?;
                println!("{}", response.text());
                eprintln!("[{} / {} tokens / ${:.4}]", response.provider, response.usage.total(), response.cost_usd);
            }
        }

        Command::Checkpoint { action } => {
            let parts = build_parts(config)?;
            match action {
                CheckpointAction::Create { name, session } => {
                    match parts.checkpoints.create_checkpoint(&session, Some(&name)).await? {
                        Some(cp) => println!("{} checkpoint {} ({} changes)", "✓".green(), cp.id.cyan(), cp.changes.len()),
                        None => println!("No pending changes for session {session}"),
                    }
                }
                CheckpointAction::List { session } => {
                    let checkpoints = parts.checkpoints.list_checkpoints(&session).await?;
                    if checkpoints.is_empty() {
                        println!("No checkpoints");
                    }
                    for cp in checkpoints {
                        println!("{} {} ({} changes)", cp.id.cyan(), cp.name, cp.changes.len());
                    }
                }
                CheckpointAction::Rollback { id } => {
                    let report = parts.checkpoints.rollback(&id).await?;
                    for path in &report.reverted {
                        println!("{} reverted {}", "✓".green(), path.display());
                    }
                    for (path, error) in &report.errors {
                        println!("{} {} - {}", "✗".red(), path.display(), error);
                    }
                    if !report.is_complete() {
                        std::process::exit(1);
                    }
                }
            }
        }

        Command::Config { action } => match action {
            ConfigAction::Get { key } => {
                let value = serde_json::to_value(&config)?;
                let pointer = format!("/{}", key.replace('.', "/"));
                match value.pointer(&pointer) {
                    Some(v) => println!("{v}"),
                    None => {
                        eprintln!("Unknown config key: {key}");
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Set { key, value } => {
                let mut tree = serde_json::to_value(&config)?;
                let pointer = format!("/{}", key.replace('.', "/"));
                let Some(slot) = tree.pointer_mut(&pointer) else {
                    eprintln!("Unknown config key: {key}");
                    std::process::exit(1);
                };
                *slot = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));

                let updated: Config = serde_json::from_value(tree).context("New value does not fit the config")?;
                let path = Config::user_config_path().ok_or_else(|| eyre::eyre!("No home directory"))?;
                updated.save(&path)?;
                println!("{} {} updated in {}", "✓".green(), key, path.display());
            }
            ConfigAction::List => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },

        Command::Context { action } => {
            let workspace = config.workspace.clone();
            match action {
                ContextAction::Index => {
                    let count = tokio::task::spawn_blocking(move || -> Result<usize> {
                        let mut manager = contextkit::ContextManager::open(&workspace)?;
                        manager.invalidate(None);
                        manager.ensure_index()?;
                        Ok(manager.index().len())
                    })
                    .await??;
                    println!("{} Indexed {} files", "✓".green(), count);
                }
                ContextAction::Select { query, max_tokens } => {
                    let selection = tokio::task::spawn_blocking(move || -> Result<contextkit::Selection> {
                        let mut manager = contextkit::ContextManager::open(&workspace)?;
                        Ok(manager.select_relevant_files(&contextkit::SelectRequest {
                            query,
                            max_tokens,
                            ..Default::default()
                        })?)
                    })
                    .await??;

                    for file in &selection.files {
                        println!(
                            "{:.2} {} ({} tokens) {}",
                            file.score,
                            file.path.display().to_string().cyan(),
                            file.token_count,
                            file.match_reasons.join("; ").dimmed()
                        );
                    }
                    println!("{} files, {} tokens", selection.files.len(), selection.total_tokens);
                }
            }
        }

        Command::Runs { status } => {
            let parts = build_parts(config)?;
            let filter = match status {
                Some(raw) => Some(raw.parse().map_err(|e: String| eyre::eyre!(e))?),
                None => None,
            };
            let runs = parts.state.list_runs(filter).await?;
            if runs.is_empty() {
                println!("No runs");
            }
            for run in runs {
                println!(
                    "{} {} {}",
                    run.id.cyan(),
                    status_colored(&run.status.to_string()),
                    run.workspace_path.dimmed()
                );
            }
        }

        Command::Usage => {
            let parts = build_parts(config)?;
            let usage = parts.router.usage();
            println!(
                "total: {} in / {} out (${:.4})",
                usage.totals.input_tokens, usage.totals.output_tokens, usage.cost_usd
            );
            for (provider, per) in usage.per_provider {
                println!(
                    "  {}: {} requests, {} in / {} out (${:.4})",
                    provider.cyan(),
                    per.requests,
                    per.usage.input_tokens,
                    per.usage.output_tokens,
                    per.cost_usd
                );
            }
            for (id, configured) in parts.router.list_providers() {
                let mark = if configured { "✓".green() } else { "-".dimmed() };
                println!("  {mark} {id}");
            }
        }

        Command::Server { port } => {
            let port = port.unwrap_or(config.server.port);
            let parts = build_parts(config)?;
            let orchestrator = Arc::new(orchestrator_from(&parts));
            vibe::server::serve(orchestrator, port).await?;
        }
    }

    Ok(())
}
