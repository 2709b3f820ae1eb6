//! Checkpoint store: pending-change tracking, named snapshots, rollback
//!
//! Mutating tools call `track` before touching a file and
//! `update_change_content` after. `create_checkpoint` drains the session's
//! pending list into an immutable JSON file under `.vibe/checkpoints/`.
//! Pending changes are journalled to disk so a crash between track and
//! checkpoint does not lose the captured old content.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{ChangeType, Checkpoint, FileChange, RollbackReport};
use super::CheckpointError;

/// One journalled pending change
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    session_id: String,
    change: FileChange,
}

/// Checkpoint store rooted at a `.vibe` state directory
pub struct CheckpointStore {
    dir: PathBuf,
    pending: Mutex<HashMap<String, Vec<FileChange>>>,
}

impl CheckpointStore {
    /// Open the store, replaying any journalled pending changes
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = state_dir.as_ref().join("checkpoints");
        std::fs::create_dir_all(&dir)?;

        let (pending, recovered) = Self::replay_journal(&dir.join("pending.jsonl"))?;
        if recovered > 0 {
            info!(recovered, "CheckpointStore::open: recovered journalled pending changes");
        }

        Ok(Self {
            dir,
            pending: Mutex::new(pending),
        })
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join("pending.jsonl")
    }

    fn checkpoint_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn replay_journal(path: &Path) -> Result<(HashMap<String, Vec<FileChange>>, usize), CheckpointError> {
        let mut pending: HashMap<String, Vec<FileChange>> = HashMap::new();
        if !path.exists() {
            return Ok((pending, 0));
        }

        let content = std::fs::read_to_string(path)?;
        let mut count = 0usize;

        for line in content.lines() {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => {
                    pending.entry(entry.session_id).or_default().push(entry.change);
                    count += 1;
                }
                Err(e) => warn!(error = %e, "replay_journal: skipping unreadable entry"),
            }
        }
        Ok((pending, count))
    }

    fn journal_append(&self, entry: &JournalEntry) -> Result<(), CheckpointError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())?;
        file.lock_exclusive()?;
        let result = (|| -> Result<(), CheckpointError> {
            let mut file = &file;
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
            Ok(())
        })();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    fn journal_rewrite(&self, pending: &HashMap<String, Vec<FileChange>>) -> Result<(), CheckpointError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.journal_path())?;
        file.lock_exclusive()?;
        let result = (|| -> Result<(), CheckpointError> {
            let mut file = &file;
            for (session_id, changes) in pending {
                for change in changes {
                    let line = serde_json::to_string(&JournalEntry {
                        session_id: session_id.clone(),
                        change: change.clone(),
                    })?;
                    writeln!(file, "{line}")?;
                }
            }
            Ok(())
        })();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// Record an upcoming mutation. For modify and delete the current file
    /// contents are captured as `old_content` before the tool runs.
    pub async fn track(
        &self,
        session_id: &str,
        path: &Path,
        change_type: ChangeType,
    ) -> Result<(), CheckpointError> {
        debug!(%session_id, path = %path.display(), %change_type, "track: called");

        let old_content = match change_type {
            ChangeType::Create => None,
            ChangeType::Modify | ChangeType::Delete => Some(tokio::fs::read_to_string(path).await?),
        };

        let change = FileChange {
            path: path.to_path_buf(),
            change_type,
            old_content,
            new_content: None,
            tracked_at: chrono::Utc::now().timestamp_millis(),
        };

        self.journal_append(&JournalEntry {
            session_id: session_id.to_string(),
            change: change.clone(),
        })?;

        let mut pending = self.pending.lock().await;
        pending.entry(session_id.to_string()).or_default().push(change);
        Ok(())
    }

    /// Record the bytes a completed mutation left behind. Applies to the most
    /// recent pending change for the path.
    pub async fn update_change_content(
        &self,
        session_id: &str,
        path: &Path,
        new_content: impl Into<String>,
    ) -> Result<(), CheckpointError> {
        debug!(%session_id, path = %path.display(), "update_change_content: called");
        let mut pending = self.pending.lock().await;

        let changes = pending
            .get_mut(session_id)
            .ok_or_else(|| CheckpointError::NotFound(format!("no pending changes for session {session_id}")))?;

        let change = changes
            .iter_mut()
            .rev()
            .find(|c| c.path == path)
            .ok_or_else(|| CheckpointError::NotFound(format!("no pending change for {}", path.display())))?;

        change.new_content = Some(new_content.into());
        self.journal_rewrite(&pending)
    }

    /// Number of pending changes for a session
    pub async fn pending_count(&self, session_id: &str) -> usize {
        self.pending.lock().await.get(session_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Human-readable summary of pending changes
    pub async fn diff_summary(&self, session_id: &str) -> String {
        let pending = self.pending.lock().await;
        let changes = pending.get(session_id).map(|c| c.as_slice()).unwrap_or(&[]);

        let created = changes.iter().filter(|c| c.change_type == ChangeType::Create).count();
        let modified = changes.iter().filter(|c| c.change_type == ChangeType::Modify).count();
        let deleted = changes.iter().filter(|c| c.change_type == ChangeType::Delete).count();

        format!(
            "{} pending changes ({} created, {} modified, {} deleted)",
            changes.len(),
            created,
            modified,
            deleted
        )
    }

    /// Atomically drain pending changes into a named checkpoint. Returns None
    /// when the session has nothing pending.
    pub async fn create_checkpoint(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        debug!(%session_id, ?name, "create_checkpoint: called");
        let mut pending = self.pending.lock().await;

        let changes = match pending.remove(session_id) {
            Some(changes) if !changes.is_empty() => changes,
            _ => {
                debug!(%session_id, "create_checkpoint: nothing pending");
                return Ok(None);
            }
        };

        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("checkpoint-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S")));
        let checkpoint = Checkpoint::new(session_id, name, changes);

        let path = self.checkpoint_path(&checkpoint.id);
        let json = serde_json::to_string_pretty(&checkpoint)?;
        std::fs::write(&path, json)?;

        self.journal_rewrite(&pending)?;
        drop(pending);

        info!(id = %checkpoint.id, name = %checkpoint.name, changes = checkpoint.changes.len(), "Checkpoint created");
        Ok(Some(checkpoint))
    }

    /// All checkpoints for a session, oldest first
    pub async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut checkpoints = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<Checkpoint>(&content) {
                    Ok(cp) if cp.session_id == session_id => checkpoints.push(cp),
                    Ok(_) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "list_checkpoints: unreadable checkpoint"),
                }
            }
        }

        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints)
    }

    /// Fetch one checkpoint by id
    pub async fn get_checkpoint(&self, id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.checkpoint_path(id);
        if !path.exists() {
            return Err(CheckpointError::NotFound(format!("checkpoint {id}")));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Revert a checkpoint's changes in reverse-of-application order.
    /// Partial failures are reported per path; rollback is idempotent.
    pub async fn rollback(&self, id: &str) -> Result<RollbackReport, CheckpointError> {
        let checkpoint = self.get_checkpoint(id).await?;
        debug!(%id, changes = checkpoint.changes.len(), "rollback: called");

        let mut report = RollbackReport::default();

        for change in checkpoint.changes.iter().rev() {
            let result = match change.change_type {
                ChangeType::Create => match tokio::fs::remove_file(&change.path).await {
                    Ok(()) => Ok(()),
                    // Already gone: idempotent
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.to_string()),
                },
                ChangeType::Modify | ChangeType::Delete => match &change.old_content {
                    Some(old) => tokio::fs::write(&change.path, old).await.map_err(|e| e.to_string()),
                    None => Err("no old content recorded".to_string()),
                },
            };

            match result {
                Ok(()) => report.reverted.push(change.path.clone()),
                Err(message) => {
                    warn!(path = %change.path.display(), %message, "rollback: failed to revert");
                    report.errors.push((change.path.clone(), message));
                }
            }
        }

        info!(%id, reverted = report.reverted.len(), errors = report.errors.len(), "Rollback complete");
        Ok(report)
    }

    /// Delete a checkpoint file
    pub async fn delete_checkpoint(&self, id: &str) -> Result<bool, CheckpointError> {
        let path = self.checkpoint_path(id);
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store_in(dir: &Path) -> CheckpointStore {
        CheckpointStore::open(dir).unwrap()
    }

    #[tokio::test]
    async fn test_track_captures_old_content() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let file = temp.path().join("a.txt");
        std::fs::write(&file, "original").unwrap();

        store.track("s1", &file, ChangeType::Modify).await.unwrap();
        std::fs::write(&file, "mutated").unwrap();
        store.update_change_content("s1", &file, "mutated").await.unwrap();

        let cp = store.create_checkpoint("s1", Some("edit")).await.unwrap().unwrap();
        assert_eq!(cp.changes.len(), 1);
        assert_eq!(cp.changes[0].old_content.as_deref(), Some("original"));
        assert_eq!(cp.changes[0].new_content.as_deref(), Some("mutated"));
    }

    #[tokio::test]
    async fn test_create_checkpoint_empty_returns_none() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        assert!(store.create_checkpoint("s1", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_restores_bytes_exactly() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let modified = temp.path().join("mod.txt");
        let created = temp.path().join("new.txt");
        let deleted = temp.path().join("gone.txt");
        std::fs::write(&modified, "before").unwrap();
        std::fs::write(&deleted, "kept content").unwrap();

        store.track("s1", &modified, ChangeType::Modify).await.unwrap();
        std::fs::write(&modified, "after").unwrap();

        store.track("s1", &created, ChangeType::Create).await.unwrap();
        std::fs::write(&created, "brand new").unwrap();

        store.track("s1", &deleted, ChangeType::Delete).await.unwrap();
        std::fs::remove_file(&deleted).unwrap();

        let cp = store.create_checkpoint("s1", None).await.unwrap().unwrap();
        let report = store.rollback(&cp.id).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(std::fs::read_to_string(&modified).unwrap(), "before");
        assert!(!created.exists());
        assert_eq!(std::fs::read_to_string(&deleted).unwrap(), "kept content");
    }

    #[tokio::test]
    async fn test_rollback_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let created = temp.path().join("new.txt");
        store.track("s1", &created, ChangeType::Create).await.unwrap();
        std::fs::write(&created, "x").unwrap();

        let cp = store.create_checkpoint("s1", None).await.unwrap().unwrap();
        assert!(store.rollback(&cp.id).await.unwrap().is_complete());
        // Second rollback: file already gone, still clean
        assert!(store.rollback(&cp.id).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_same_path_double_change_reverts_to_oldest() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let file = temp.path().join("twice.txt");
        std::fs::write(&file, "v1").unwrap();

        store.track("s1", &file, ChangeType::Modify).await.unwrap();
        std::fs::write(&file, "v2").unwrap();
        store.track("s1", &file, ChangeType::Modify).await.unwrap();
        std::fs::write(&file, "v3").unwrap();

        let cp = store.create_checkpoint("s1", None).await.unwrap().unwrap();
        store.rollback(&cp.id).await.unwrap();

        // Reverse order restores v2 then v1; v1 wins
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        store.track("s1", &a, ChangeType::Create).await.unwrap();
        store.track("s2", &b, ChangeType::Create).await.unwrap();

        let cp = store.create_checkpoint("s1", None).await.unwrap().unwrap();
        assert_eq!(cp.changes.len(), 1);
        assert_eq!(store.pending_count("s2").await, 1);

        let listed = store.list_checkpoints("s1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store.list_checkpoints("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_journal_survives_reopen() {
        let temp = tempdir().unwrap();
        {
            let store = store_in(temp.path()).await;
            let file = temp.path().join("a.txt");
            std::fs::write(&file, "original").unwrap();
            store.track("s1", &file, ChangeType::Modify).await.unwrap();
            // Simulated crash: no checkpoint created
        }

        let store = CheckpointStore::open(temp.path()).unwrap();
        assert_eq!(store.pending_count("s1").await, 1);

        let cp = store.create_checkpoint("s1", None).await.unwrap().unwrap();
        assert_eq!(cp.changes[0].old_content.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn test_diff_summary_counts() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let a = temp.path().join("a.txt");
        std::fs::write(&a, "x").unwrap();
        store.track("s1", &a, ChangeType::Modify).await.unwrap();
        store.track("s1", Path::new(&temp.path().join("b.txt")), ChangeType::Create).await.unwrap();

        let summary = store.diff_summary("s1").await;
        assert!(summary.contains("2 pending changes"));
        assert!(summary.contains("1 created"));
        assert!(summary.contains("1 modified"));
    }
}
