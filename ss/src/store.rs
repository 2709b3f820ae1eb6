//! Core Store implementation over rusqlite

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::migrations::apply_migrations;
use crate::records::{IoLogEntry, PersistedItem, RunRecord, RunStatus, StepRecord, StepStatus, now_ms};

/// Synchronous session store over a single SQLite connection
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the database at `path`, applying pending migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Store::open: called");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let applied = apply_migrations(&mut conn)?;
        if applied > 0 {
            info!(applied, "Store::open: migrations applied");
        }

        Ok(Self { conn, path })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // --- runs ---

    /// Insert a new run record
    pub fn create_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        debug!(run_id = %run.id, "create_run: called");
        self.conn.execute(
            "INSERT INTO runs (id, user_id, workspace_path, status, config_snapshot, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.id,
                run.user_id,
                run.workspace_path,
                run.status.to_string(),
                serde_json::to_string(&run.config_snapshot)?,
                run.created_at,
            ],
        )?;
        Ok(())
    }

    /// Update a run's status
    pub fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<(), StoreError> {
        debug!(%run_id, %status, "update_run_status: called");
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_string(), run_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("run {run_id}")));
        }
        Ok(())
    }

    /// Fetch one run
    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let run = self
            .conn
            .query_row(
                "SELECT id, user_id, workspace_path, status, config_snapshot, created_at
                 FROM runs WHERE id = ?1",
                params![run_id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// List runs, optionally filtered by status, newest first
    pub fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, StoreError> {
        let mut runs = Vec::new();
        match status {
            Some(s) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, user_id, workspace_path, status, config_snapshot, created_at
                     FROM runs WHERE status = ?1 ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map(params![s.to_string()], row_to_run)?;
                for row in rows {
                    runs.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, user_id, workspace_path, status, config_snapshot, created_at
                     FROM runs ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map([], row_to_run)?;
                for row in rows {
                    runs.push(row?);
                }
            }
        }
        Ok(runs)
    }

    /// Delete a run; steps cascade
    pub fn delete_run(&self, run_id: &str) -> Result<bool, StoreError> {
        debug!(%run_id, "delete_run: called");
        let changed = self.conn.execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
        Ok(changed > 0)
    }

    // --- steps ---

    /// Insert a new step record
    pub fn create_step(&self, step: &StepRecord) -> Result<(), StoreError> {
        debug!(step_id = %step.id, run_id = %step.run_id, step_number = step.step_number, "create_step: called");
        self.conn.execute(
            "INSERT INTO workflow_steps
             (id, run_id, step_number, primitive, task, status, input, output, error, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                step.id,
                step.run_id,
                step.step_number,
                step.primitive,
                step.task,
                step.status.to_string(),
                serde_json::to_string(&step.input)?,
                serde_json::to_string(&step.output)?,
                step.error,
                step.duration_ms,
                step.created_at,
            ],
        )?;
        Ok(())
    }

    /// Mark a step as running
    pub fn update_step_status(&self, step_id: &str, status: StepStatus) -> Result<(), StoreError> {
        debug!(%step_id, %status, "update_step_status: called");
        let changed = self.conn.execute(
            "UPDATE workflow_steps SET status = ?1 WHERE id = ?2",
            params![status.to_string(), step_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("step {step_id}")));
        }
        Ok(())
    }

    /// Record a step's terminal result
    pub fn update_step_result(
        &self,
        step_id: &str,
        output: &Value,
        status: StepStatus,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), StoreError> {
        debug!(%step_id, %status, duration_ms, "update_step_result: called");
        let changed = self.conn.execute(
            "UPDATE workflow_steps SET output = ?1, status = ?2, error = ?3, duration_ms = ?4 WHERE id = ?5",
            params![serde_json::to_string(output)?, status.to_string(), error, duration_ms, step_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("step {step_id}")));
        }
        Ok(())
    }

    /// All steps of a run in plan order
    pub fn steps_for_run(&self, run_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, step_number, primitive, task, status, input, output, error, duration_ms, created_at
             FROM workflow_steps WHERE run_id = ?1 ORDER BY step_number ASC",
        )?;
        let rows = stmt.query_map(params![run_id], row_to_step)?;
        let mut steps = Vec::new();
        for row in rows {
            steps.push(row?);
        }
        Ok(steps)
    }

    /// Derive the run status from its steps: success iff every step succeeded
    pub fn derived_run_status(&self, run_id: &str) -> Result<RunStatus, StoreError> {
        let steps = self.steps_for_run(run_id)?;
        if steps.is_empty() {
            return Ok(RunStatus::Success);
        }
        if steps.iter().all(|s| s.status == StepStatus::Success) {
            Ok(RunStatus::Success)
        } else {
            Ok(RunStatus::Failed)
        }
    }

    // --- persistence items ---

    /// Upsert one key-value item
    pub fn put_item(&self, key: &str, value: &Value, metadata: &Value) -> Result<(), StoreError> {
        debug!(%key, "put_item: called");
        self.conn.execute(
            "INSERT INTO persistence_items (key, value, metadata, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET value = ?2, metadata = ?3, updated_at = ?4",
            params![key, serde_json::to_string(value)?, serde_json::to_string(metadata)?, now_ms()],
        )?;
        Ok(())
    }

    /// Fetch one item
    pub fn get_item(&self, key: &str) -> Result<Option<PersistedItem>, StoreError> {
        let item = self
            .conn
            .query_row(
                "SELECT key, value, metadata, updated_at FROM persistence_items WHERE key = ?1",
                params![key],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// List items with a key prefix, most recently updated first
    pub fn list_items(&self, prefix: &str) -> Result<Vec<PersistedItem>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value, metadata, updated_at FROM persistence_items
             WHERE key LIKE ?1 || '%' ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![prefix], row_to_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Remove one item
    pub fn delete_item(&self, key: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM persistence_items WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    // --- determinism I/O log ---

    /// Append one recorded tool call
    pub fn append_io(&self, entry: &IoLogEntry) -> Result<(), StoreError> {
        debug!(run_id = %entry.run_id, seq = entry.seq, tool = %entry.tool, "append_io: called");
        self.conn.execute(
            "INSERT INTO io_log (run_id, seq, tool, input, output, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.run_id,
                entry.seq,
                entry.tool,
                serde_json::to_string(&entry.input)?,
                serde_json::to_string(&entry.output)?,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// The full recorded log for a run, in call order
    pub fn replay_log(&self, run_id: &str) -> Result<Vec<IoLogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, seq, tool, input, output, created_at FROM io_log WHERE run_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![run_id], row_to_io)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Drop the recorded log for a run
    pub fn clear_io(&self, run_id: &str) -> Result<usize, StoreError> {
        let changed = self.conn.execute("DELETE FROM io_log WHERE run_id = ?1", params![run_id])?;
        Ok(changed)
    }
}

fn parse_json(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::Null)
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    let status_raw: String = row.get(3)?;
    let snapshot_raw: String = row.get(4)?;
    Ok(RunRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        workspace_path: row.get(2)?,
        status: status_raw.parse().unwrap_or(RunStatus::Failed),
        config_snapshot: parse_json(snapshot_raw),
        created_at: row.get(5)?,
    })
}

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<StepRecord> {
    let status_raw: String = row.get(5)?;
    let input_raw: String = row.get(6)?;
    let output_raw: String = row.get(7)?;
    Ok(StepRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        step_number: row.get(2)?,
        primitive: row.get(3)?,
        task: row.get(4)?,
        status: status_raw.parse().unwrap_or(StepStatus::Failed),
        input: parse_json(input_raw),
        output: parse_json(output_raw),
        error: row.get(8)?,
        duration_ms: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedItem> {
    let value_raw: String = row.get(1)?;
    let metadata_raw: String = row.get(2)?;
    Ok(PersistedItem {
        key: row.get(0)?,
        value: parse_json(value_raw),
        metadata: parse_json(metadata_raw),
        updated_at: row.get(3)?,
    })
}

fn row_to_io(row: &rusqlite::Row<'_>) -> rusqlite::Result<IoLogEntry> {
    let input_raw: String = row.get(3)?;
    let output_raw: String = row.get(4)?;
    Ok(IoLogEntry {
        run_id: row.get(0)?,
        seq: row.get(1)?,
        tool: row.get(2)?,
        input: parse_json(input_raw),
        output: parse_json(output_raw),
        created_at: row.get(5)?,
    })
}
