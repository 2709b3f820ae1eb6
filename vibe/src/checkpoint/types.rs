//! Checkpoint record types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of mutation a FileChange records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Modify => write!(f, "modify"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One recorded file mutation
///
/// `old_content` is present for modify and delete (captured before the
/// mutation); `new_content` is filled in after the mutation completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub change_type: ChangeType,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub tracked_at: i64,
}

/// A named, immutable bundle of file changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub created_at: i64,
    pub changes: Vec<FileChange>,
}

impl Checkpoint {
    /// Create a checkpoint from drained pending changes
    pub fn new(session_id: impl Into<String>, name: impl Into<String>, changes: Vec<FileChange>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            name: name.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            changes,
        }
    }
}

/// Outcome of a rollback; partial rollback is reported, not hidden
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    pub reverted: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

impl RollbackReport {
    /// True when every change reverted cleanly
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}
