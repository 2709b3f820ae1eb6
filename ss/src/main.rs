use clap::Parser;
use colored::*;
use eyre::{Context, Result};

use sessionstore::cli::{Cli, Command};
use sessionstore::{DB_FILENAME, Store};

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn status_colored(status: &str) -> ColoredString {
    match status {
        "success" => status.green(),
        "failed" => status.red(),
        "running" => status.yellow(),
        "cancelled" => status.dimmed(),
        _ => status.normal(),
    }
}

fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let db_path = cli
        .db
        .unwrap_or_else(|| std::path::PathBuf::from(".vibe").join(DB_FILENAME));
    let store = Store::open(&db_path).context("Failed to open session database")?;

    match cli.command {
        Command::Runs { status } => {
            let filter = match status {
                Some(raw) => Some(raw.parse().map_err(|e: String| eyre::eyre!(e))?),
                None => None,
            };
            let runs = store.list_runs(filter)?;
            if runs.is_empty() {
                println!("No runs");
            }
            for run in runs {
                println!(
                    "{} {} {} {}",
                    run.id.cyan(),
                    status_colored(&run.status.to_string()),
                    run.workspace_path.dimmed(),
                    chrono::DateTime::from_timestamp_millis(run.created_at)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default()
                );
            }
        }
        Command::Steps { run_id } => {
            let steps = store.steps_for_run(&run_id)?;
            if steps.is_empty() {
                println!("No steps for run {run_id}");
            }
            for step in steps {
                println!(
                    "{:>3} {} {} {}ms{}",
                    step.step_number,
                    step.primitive.yellow(),
                    status_colored(&step.status.to_string()),
                    step.duration_ms,
                    step.error.map(|e| format!(" error: {e}").red().to_string()).unwrap_or_default()
                );
            }
        }
        Command::Migrate => {
            // Migrations already ran on open; report the state
            println!("{} Schema up to date ({} migrations)", "✓".green(), sessionstore::MIGRATIONS.len());
        }
        Command::Items { prefix } => {
            let items = store.list_items(&prefix)?;
            for item in items {
                println!("{} {}", item.key.cyan(), item.value);
            }
        }
        Command::Replay { run_id } => {
            let log = store.replay_log(&run_id)?;
            for entry in log {
                println!("{:>4} {} {}", entry.seq, entry.tool.yellow(), entry.input);
            }
        }
    }

    Ok(())
}
