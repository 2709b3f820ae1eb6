//! Idempotent schema migrations
//!
//! Each migration runs at most once, inside its own transaction, with its
//! name recorded in the `migrations` table. Re-applying the full set is a
//! no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::records::now_ms;

/// Ordered migration set: (name, batch SQL)
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_runs",
        "CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            workspace_path TEXT NOT NULL,
            status TEXT NOT NULL,
            config_snapshot TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );",
    ),
    (
        "0002_workflow_steps",
        "CREATE TABLE IF NOT EXISTS workflow_steps (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            step_number INTEGER NOT NULL,
            primitive TEXT NOT NULL,
            task TEXT NOT NULL,
            status TEXT NOT NULL,
            input TEXT NOT NULL,
            output TEXT NOT NULL,
            error TEXT,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workflow_steps_run_id ON workflow_steps(run_id);
        CREATE INDEX IF NOT EXISTS idx_workflow_steps_status ON workflow_steps(status);",
    ),
    (
        "0003_persistence_items",
        "CREATE TABLE IF NOT EXISTS persistence_items (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL
        );",
    ),
    (
        "0004_io_log",
        "CREATE TABLE IF NOT EXISTS io_log (
            run_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            tool TEXT NOT NULL,
            input TEXT NOT NULL,
            output TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (run_id, seq)
        );",
    ),
];

/// Apply all pending migrations. Safe to call on every open.
pub fn apply_migrations(conn: &mut Connection) -> Result<usize, StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            name TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let mut applied = 0usize;
    for (name, sql) in MIGRATIONS {
        let already: bool = conn
            .prepare("SELECT 1 FROM migrations WHERE name = ?1")?
            .exists([name])?;
        if already {
            debug!(%name, "apply_migrations: already applied");
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql).map_err(|e| StoreError::Migration {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO migrations (name, applied_at) VALUES (?1, ?2)",
            rusqlite::params![name, now_ms()],
        )?;
        tx.commit()?;

        info!(%name, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_dump(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_migrations_apply_once() {
        let mut conn = Connection::open_in_memory().unwrap();

        let first = apply_migrations(&mut conn).unwrap();
        assert_eq!(first, MIGRATIONS.len());

        let second = apply_migrations(&mut conn).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn test_migration_idempotence_schema_identical() {
        let mut once = Connection::open_in_memory().unwrap();
        apply_migrations(&mut once).unwrap();
        let schema_once = schema_dump(&once);

        let mut thrice = Connection::open_in_memory().unwrap();
        for _ in 0..3 {
            apply_migrations(&mut thrice).unwrap();
        }
        let schema_thrice = schema_dump(&thrice);

        assert_eq!(schema_once, schema_thrice);
    }

    #[test]
    fn test_expected_tables_exist() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        let tables = schema_dump(&conn);
        for expected in ["runs", "workflow_steps", "persistence_items", "io_log", "migrations"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
        assert!(tables.iter().any(|t| t == "idx_workflow_steps_run_id"));
        assert!(tables.iter().any(|t| t == "idx_workflow_steps_status"));
    }
}
