//! SessionStore - embedded SQLite persistence for the vibe engine
//!
//! Owns the `.vibe/state.db` database: run and step history, the key-value
//! persistence items table, the determinism I/O log, and idempotent schema
//! migrations.
//!
//! # Schema
//!
//! ```text
//! runs(id, user_id, workspace_path, status, config_snapshot, created_at)
//! workflow_steps(id, run_id, step_number, primitive, task, status,
//!                input, output, error, duration_ms, created_at)
//! persistence_items(key, value, metadata, updated_at)
//! io_log(run_id, seq, tool, input, output, created_at)
//! migrations(name, applied_at)
//! ```

pub mod cli;
mod error;
mod migrations;
mod records;
mod store;

pub use error::StoreError;
pub use migrations::{MIGRATIONS, apply_migrations};
pub use records::{IoLogEntry, PersistedItem, RunRecord, RunStatus, StepRecord, StepStatus, now_ms};
pub use store::Store;

/// Database filename under the `.vibe` state directory
pub const DB_FILENAME: &str = "state.db";
