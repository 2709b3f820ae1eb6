//! Sandbox and approval policy
//!
//! Blocklists for dangerous shell builtins and sensitive path prefixes,
//! resource caps for shell output, and the approval policy consulted before
//! risky tools run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::RiskLevel;

/// Shell builtins and commands never allowed through the shell tool
pub const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "rmdir", "dd", "mkfs", "fdisk", "chmod", "chown", "sudo", "su", "doas", "shutdown", "reboot", "halt",
    "kill", "killall", "mount", "umount",
];

/// Absolute path prefixes never writable through filesystem tools
pub const BLOCKED_PATH_PREFIXES: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/dev", "/proc", "/sys", "/var", "/root/.ssh", "/root/.aws",
];

/// Home-relative directories never writable (credential stores)
pub const BLOCKED_HOME_DIRS: &[&str] = &[".ssh", ".aws", ".gnupg", ".config/gcloud", ".kube"];

/// Task-level approval mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Approve everything without asking
    Auto,
    /// Consult the approval gate for risky operations
    #[default]
    Prompt,
    /// Deny everything that needs approval
    Never,
}

impl std::str::FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "prompt" => Ok(Self::Prompt),
            "never" => Ok(Self::Never),
            other => Err(format!("Unknown approval mode: {other}")),
        }
    }
}

/// Consent interface; the interactive UI implements this outside the core
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Ask for consent to run the described operation
    async fn confirm(&self, summary: &str, details: &[String], risk: RiskLevel) -> bool;
}

/// Gate with a fixed answer (auto mode, tests)
pub struct StaticGate(pub bool);

#[async_trait]
impl ApprovalGate for StaticGate {
    async fn confirm(&self, _summary: &str, _details: &[String], _risk: RiskLevel) -> bool {
        self.0
    }
}

/// Resource limits for shell execution
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Output is truncated past this many bytes
    pub max_output_bytes: usize,

    /// Default shell deadline
    pub command_timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: 256 * 1024,
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Check a shell command line against the blocklist. Every pipeline segment
/// is inspected so `echo x | sudo tee` is caught too.
pub fn blocked_command(command: &str) -> Option<&'static str> {
    for segment in command.split(['|', ';', '&']) {
        let first = segment.split_whitespace().next().unwrap_or("");
        let base = first.rsplit('/').next().unwrap_or(first);
        if let Some(hit) = BLOCKED_COMMANDS.iter().find(|b| **b == base) {
            debug!(%command, blocked = %hit, "blocked_command: hit");
            return Some(hit);
        }
    }
    None
}

/// Check a path against the blocked prefixes
pub fn blocked_path(path: &Path) -> bool {
    let abs = path.to_string_lossy();

    if BLOCKED_PATH_PREFIXES.iter().any(|prefix| abs.starts_with(prefix)) {
        debug!(path = %abs, "blocked_path: prefix hit");
        return true;
    }

    if let Some(home) = dirs::home_dir() {
        for dir in BLOCKED_HOME_DIRS {
            if path.starts_with(home.join(dir)) {
                debug!(path = %abs, "blocked_path: home dir hit");
                return true;
            }
        }
    }

    false
}

/// Normalise `.` and `..` components without touching the filesystem, so
/// traversal is caught even for paths that do not exist yet.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                // The root itself is never popped: /a/../../b is /b
                if parts.last().map(|p| p.as_os_str() != "/").unwrap_or(false) {
                    parts.pop();
                }
            }
            std::path::Component::CurDir => {}
            other => parts.push(other.as_os_str().to_os_string()),
        }
    }
    parts.iter().collect()
}
