//! Long-lived session records for autonomous runs
//!
//! One JSON file per session under `.vibe/sessions/`, updated after every
//! iteration so a crashed loop can be inspected or resumed.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

/// One loop iteration's record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number (1-indexed)
    pub number: u32,

    /// Truncated response text
    pub response_summary: String,

    /// Action items pulled from the response
    #[serde(default)]
    pub action_items: Vec<String>,

    /// Completion fraction in [0, 1]
    pub completion: f64,

    /// Wall-clock duration of the iteration
    pub duration_ms: u64,

    /// Errors hit during the iteration
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A session wrapping one autonomous task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub task: String,
    pub status: SessionStatus,
    pub iterations: Vec<IterationRecord>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    /// Start a new active session
    pub fn new(task: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::now_v7().to_string(),
            task: task.into(),
            status: SessionStatus::Active,
            iterations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append one iteration record
    pub fn push(&mut self, record: IterationRecord) {
        self.iterations.push(record);
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Transition the lifecycle status
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Compact history text for prompt injection, newest last, truncated
    pub fn history_text(&self, max_chars: usize) -> String {
        let mut text = String::new();
        for record in &self.iterations {
            text.push_str(&format!(
                "iteration {}: completion {:.0}% - {}\n",
                record.number,
                record.completion * 100.0,
                record.response_summary
            ));
        }
        if text.len() > max_chars {
            // Keep the tail: recent iterations matter most
            let cut = text.len() - max_chars;
            text = format!("...{}", &text[cut..]);
        }
        text
    }

    fn path_in(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{id}.json"))
    }

    /// Persist under the sessions directory
    pub fn save(&self, sessions_dir: &Path) -> Result<()> {
        debug!(id = %self.id, "Session::save: called");
        std::fs::create_dir_all(sessions_dir)?;
        let path = Self::path_in(sessions_dir, &self.id);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .context(format!("Failed to write session {}", path.display()))?;
        Ok(())
    }

    /// Load one session by id
    pub fn load(sessions_dir: &Path, id: &str) -> Result<Self> {
        let path = Self::path_in(sessions_dir, id);
        let content = std::fs::read_to_string(&path).context(format!("Session not found: {id}"))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// List all sessions, newest first
    pub fn list(sessions_dir: &Path) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        if !sessions_dir.exists() {
            return Ok(sessions);
        }

        for entry in std::fs::read_dir(sessions_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false)
                && let Ok(content) = std::fs::read_to_string(&path)
                && let Ok(session) = serde_json::from_str::<Session>(&content)
            {
                sessions.push(session);
            }
        }

        sessions.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(n: u32, completion: f64) -> IterationRecord {
        IterationRecord {
            number: n,
            response_summary: format!("did part {n}"),
            action_items: vec![],
            completion,
            duration_ms: 10,
            errors: vec![],
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = tempdir().unwrap();
        let mut session = Session::new("summarize the README");
        session.push(record(1, 0.5));
        session.set_status(SessionStatus::Completed);
        session.save(temp.path()).unwrap();

        let loaded = Session::load(temp.path(), &session.id).unwrap();
        assert_eq!(loaded.task, "summarize the README");
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.iterations.len(), 1);
    }

    #[test]
    fn test_list_newest_first() {
        let temp = tempdir().unwrap();

        let mut first = Session::new("first");
        first.created_at = 100;
        first.save(temp.path()).unwrap();

        let mut second = Session::new("second");
        second.created_at = 200;
        second.save(temp.path()).unwrap();

        let sessions = Session::list(temp.path()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].task, "second");
    }

    #[test]
    fn test_history_text_truncates_from_front() {
        let mut session = Session::new("t");
        for n in 1..=50 {
            session.push(record(n, 0.1));
        }

        let text = session.history_text(200);
        assert!(text.len() <= 203);
        assert!(text.starts_with("..."));
        assert!(text.contains("iteration 50"));
    }
}
