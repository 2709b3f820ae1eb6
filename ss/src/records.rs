//! Run, step, and log record types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown run status: {other}")),
        }
    }
}

/// Step status - terminal states are success and failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown step status: {other}")),
        }
    }
}

/// One end-to-end execution of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier (UUID v7)
    pub id: String,

    /// Caller identity
    pub user_id: String,

    /// Workspace the run operates on
    pub workspace_path: String,

    /// Current status
    pub status: RunStatus,

    /// Config frozen at creation time
    pub config_snapshot: Value,

    /// Creation timestamp (unix ms)
    pub created_at: i64,
}

impl RunRecord {
    /// Create a new pending run
    pub fn new(user_id: impl Into<String>, workspace_path: impl Into<String>, config_snapshot: Value) -> Self {
        let run = Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            workspace_path: workspace_path.into(),
            status: RunStatus::Pending,
            config_snapshot,
            created_at: now_ms(),
        };
        debug!(run_id = %run.id, "RunRecord::new: created");
        run
    }
}

/// One persisted step of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Unique identifier (UUID v7)
    pub id: String,

    /// Owning run
    pub run_id: String,

    /// Position within the plan (0-indexed)
    pub step_number: u32,

    /// Primitive that executed this step
    pub primitive: String,

    /// Step task description
    pub task: String,

    /// Current status
    pub status: StepStatus,

    /// Input blob
    pub input: Value,

    /// Output blob (aggregated runtime phase records)
    pub output: Value,

    /// Classified error, if the step failed
    pub error: Option<String>,

    /// Wall-clock duration
    pub duration_ms: i64,

    /// Creation timestamp (unix ms)
    pub created_at: i64,
}

impl StepRecord {
    /// Create a new pending step
    pub fn new(run_id: impl Into<String>, step_number: u32, primitive: impl Into<String>, task: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            run_id: run_id.into(),
            step_number,
            primitive: primitive.into(),
            task: task.into(),
            status: StepStatus::Pending,
            input,
            output: Value::Null,
            error: None,
            duration_ms: 0,
            created_at: now_ms(),
        }
    }
}

/// One key-value persistence item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedItem {
    pub key: String,
    pub value: Value,
    pub metadata: Value,
    pub updated_at: i64,
}

/// One recorded tool call in the determinism log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoLogEntry {
    /// Owning run
    pub run_id: String,

    /// Position in the run's call sequence (0-indexed)
    pub seq: u32,

    /// Tool name
    pub tool: String,

    /// Tool input as passed
    pub input: Value,

    /// Tool output as observed
    pub output: Value,

    /// Recording timestamp (unix ms)
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_step_status_rejects_unknown() {
        assert!("bogus".parse::<StepStatus>().is_err());
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = RunRecord::new("user", "/tmp/ws", serde_json::json!({}));
        assert_eq!(run.status, RunStatus::Pending);
        assert!(!run.id.is_empty());
    }

    #[test]
    fn test_new_step_defaults() {
        let step = StepRecord::new("run-1", 0, "execution", "list files", serde_json::json!({"tool": "list_directory"}));
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.output, Value::Null);
        assert!(step.error.is_none());
    }
}
