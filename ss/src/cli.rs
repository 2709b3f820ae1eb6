//! CLI argument parsing for sessionstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ss")]
#[command(author, version, about = "Inspect the vibe session database", long_about = None)]
pub struct Cli {
    /// Database path (default: .vibe/state.db)
    #[arg(short, long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List runs
    Runs {
        /// Filter by status (pending|running|success|failed|cancelled)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show steps for a run
    Steps {
        /// Run ID
        #[arg(required = true)]
        run_id: String,
    },

    /// Apply pending migrations
    Migrate,

    /// List persistence items by key prefix
    Items {
        /// Key prefix (default: all)
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Show the recorded I/O log for a run
    Replay {
        /// Run ID
        #[arg(required = true)]
        run_id: String,
    },
}
