//! CLI argument parsing for contextkit

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cx")]
#[command(author, version, about = "Token-budgeted workspace context selection", long_about = None)]
pub struct Cli {
    /// Workspace root (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build (or rebuild) the semantic index
    Index,

    /// Select relevant files for a query under a token budget
    Select {
        /// Relevance query
        #[arg(required = true)]
        query: String,

        /// Token budget (default: 8000)
        #[arg(short, long, default_value = "8000")]
        max_tokens: usize,

        /// Minimum relevance score
        #[arg(long, default_value = "0.0")]
        min_relevance: f64,

        /// Disable the recency multiplier
        #[arg(long)]
        no_recency: bool,
    },

    /// Search indexed symbols
    Search {
        /// Symbol query
        #[arg(required = true)]
        query: String,

        /// Maximum results to return
        #[arg(short, long, default_value = "20")]
        max_results: usize,
    },

    /// Estimate tokens for a file
    Estimate {
        /// File to estimate
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Invalidate the cached index (whole, or one path)
    Invalidate {
        /// Path to invalidate; omit to clear everything
        path: Option<PathBuf>,
    },
}
