//! Tool error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the tool layer before or during execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes the workspace {workspace}")]
    SandboxViolation { path: PathBuf, workspace: PathBuf },

    #[error("Command blocked by policy: {0}")]
    BlockedCommand(String),

    #[error("Path blocked by policy: {0}")]
    BlockedPath(PathBuf),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Approval denied: {0}")]
    Denied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Stable classification tag for persisted error columns
    pub fn classification(&self) -> &'static str {
        match self {
            Self::SandboxViolation { .. } | Self::BlockedCommand(_) | Self::BlockedPath(_) | Self::Denied(_) => {
                "permission"
            }
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(ToolError::BlockedCommand("rm".into()).classification(), "permission");
        assert_eq!(ToolError::Validation("bad".into()).classification(), "validation");
        assert_eq!(ToolError::Timeout(Duration::from_secs(60)).classification(), "timeout");
    }
}
