use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;

use contextkit::cli::{Cli, Command};
use contextkit::{ContextManager, SelectRequest, estimate_tokens};

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let root = cli.root.unwrap_or_else(|| std::path::PathBuf::from("."));
    let mut manager = ContextManager::open(&root).context("Failed to open workspace")?;

    info!(root = %root.display(), "contextkit starting");

    match cli.command {
        Command::Index => {
            manager.invalidate(None);
            manager.ensure_index()?;
            println!("{} Indexed {} files", "✓".green(), manager.index().len());
        }
        Command::Select {
            query,
            max_tokens,
            min_relevance,
            no_recency,
        } => {
            let selection = manager.select_relevant_files(&SelectRequest {
                query,
                max_tokens,
                min_relevance,
                prioritize_recent: !no_recency,
                ..Default::default()
            })?;

            for file in &selection.files {
                println!(
                    "{:.2} {} {} ({} tokens)",
                    file.score,
                    file.path.display().to_string().cyan(),
                    file.match_reasons.join("; ").dimmed(),
                    file.token_count
                );
            }
            println!(
                "{} files, {} tokens, {} skipped",
                selection.files.len(),
                selection.total_tokens,
                selection.skipped.len()
            );
        }
        Command::Search { query, max_results } => {
            let matches = manager.semantic_search(&query, None, max_results, 0.0)?;
            if matches.is_empty() {
                println!("No matches");
            } else {
                for m in matches {
                    println!(
                        "{:.2} {:?} {} in {}",
                        m.score,
                        m.kind,
                        m.symbol.yellow(),
                        m.path.display()
                    );
                }
            }
        }
        Command::Estimate { path } => {
            let content = std::fs::read_to_string(&path).context("Failed to read file")?;
            let est = estimate_tokens(&content);
            println!("Total: {}", est.total);
            println!("  Code: {}", est.code);
            println!("  Comments: {}", est.comment);
            println!("  Strings: {}", est.string);
            println!("  Whitespace: {}", est.whitespace);
        }
        Command::Invalidate { path } => {
            manager.invalidate(path.as_deref());
            println!("{} Invalidated", "✓".green());
        }
    }

    Ok(())
}
