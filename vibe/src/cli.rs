//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vibe")]
#[command(author, version, about = "AI-assisted developer agent", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workspace root (default: current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a task end-to-end: plan, approve, execute, review
    Run {
        /// Task description
        #[arg(required = true)]
        task: String,

        /// Approval mode: auto, prompt, or never
        #[arg(short, long, default_value = "prompt")]
        approval: String,

        /// Cap on plan steps
        #[arg(long)]
        max_steps: Option<u32>,

        /// Create a checkpoint when the run completes
        #[arg(long)]
        checkpoint: bool,
    },

    /// One-off completion through the provider router
    Chat {
        /// Prompt text
        #[arg(required = true)]
        prompt: String,

        /// Render deltas as they arrive
        #[arg(long)]
        stream: bool,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Run the autonomous loop on an open-ended task
    Autonomous {
        /// Task description
        #[arg(required = true)]
        task: String,

        /// Maximum loop iterations
        #[arg(long, default_value = "100")]
        max_loops: u32,

        /// Maximum wall-clock duration in minutes
        #[arg(long, default_value = "60")]
        max_duration: u64,

        /// Maximum LLM calls per hour
        #[arg(long, default_value = "100")]
        rate_limit: usize,
    },

    /// Manage checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Context manager operations
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// List runs
    Runs {
        /// Filter by status (pending|running|success|failed|cancelled)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show cumulative token usage and cost
    Usage,

    /// Start the HTTP server exposing the orchestrator
    Server {
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// Snapshot pending changes under a name
    Create {
        #[arg(required = true)]
        name: String,

        /// Session the pending changes belong to
        #[arg(short, long, required = true)]
        session: String,
    },

    /// List checkpoints for a session
    List {
        #[arg(required = true)]
        session: String,
    },

    /// Revert a checkpoint by id
    Rollback {
        #[arg(required = true)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print one value
    Get {
        #[arg(required = true)]
        key: String,
    },

    /// Set one value and persist the user config
    Set {
        #[arg(required = true)]
        key: String,

        #[arg(required = true)]
        value: String,
    },

    /// Print the resolved configuration
    List,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// Build (or rebuild) the semantic index
    Index,

    /// Select relevant files for a query
    Select {
        #[arg(required = true)]
        query: String,

        /// Token budget
        #[arg(long, default_value = "8000")]
        max_tokens: usize,
    },
}
