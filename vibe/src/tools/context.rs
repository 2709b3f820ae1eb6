//! ToolContext - execution context for tools
//!
//! Each run gets a `ToolContext` scoped to its workspace. File operations are
//! confined to the workspace; mutations are reported to the checkpoint store
//! before and after the write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::checkpoint::{ChangeType, CheckpointStore};
use crate::state::StateManager;

use super::ToolError;
use super::policy::{self, ResourceLimits};

/// Execution context for tools - scoped to a single run
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root - all file ops constrained here
    pub workspace: PathBuf,

    /// Run ID (threads through logging and the checkpoint scope)
    pub run_id: String,

    /// Whether sandbox mode is enabled (default: true)
    pub sandbox_enabled: bool,

    /// Shell resource limits
    pub limits: ResourceLimits,

    /// Checkpoint scope: store plus the session the pending changes belong to
    checkpoint: Option<(Arc<CheckpointStore>, String)>,

    /// Session store handle for memory tools
    state: Option<StateManager>,

    /// Per-run approval override; the executor's default applies otherwise
    pub approval: Option<super::executor::ApprovalPolicy>,
}

impl ToolContext {
    /// Create a new sandboxed context
    pub fn new(workspace: PathBuf, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        debug!(?workspace, %run_id, "ToolContext::new: called");
        Self {
            workspace,
            run_id,
            sandbox_enabled: true,
            limits: ResourceLimits::default(),
            checkpoint: None,
            state: None,
            approval: None,
        }
    }

    /// Create a context with sandbox disabled (tests)
    pub fn new_unsandboxed(workspace: PathBuf, run_id: impl Into<String>) -> Self {
        Self {
            sandbox_enabled: false,
            ..Self::new(workspace, run_id)
        }
    }

    /// Attach a checkpoint scope
    pub fn with_checkpoints(mut self, store: Arc<CheckpointStore>, session_id: impl Into<String>) -> Self {
        self.checkpoint = Some((store, session_id.into()));
        self
    }

    /// Attach a session store handle (memory tools)
    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    /// Override the executor's approval policy for this run
    pub fn with_approval(mut self, approval: super::executor::ApprovalPolicy) -> Self {
        self.approval = Some(approval);
        self
    }

    /// Session store handle, when attached
    pub fn state(&self) -> Option<&StateManager> {
        self.state.as_ref()
    }

    /// Checkpoint session id, when a scope is attached
    pub fn checkpoint_session(&self) -> Option<&str> {
        self.checkpoint.as_ref().map(|(_, id)| id.as_str())
    }

    /// Normalize a path relative to the workspace
    pub fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            policy::normalize(path)
        } else {
            policy::normalize(&self.workspace.join(path))
        }
    }

    /// Validate a path for reading or writing (sandbox enforcement).
    ///
    /// Paths are normalized (and canonicalized when they exist, resolving
    /// symlinks) and must stay inside the workspace. With the sandbox
    /// disabled the blocked-prefix list still applies.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "validate_path: called");
        let normalized = self.normalize_path(path);

        // For existing paths, canonicalize to resolve symlinks; for new files
        // canonicalize the nearest existing parent.
        let resolved = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(normalized.file_name().unwrap_or_default())
            } else {
                normalized.clone()
            }
        } else {
            normalized.clone()
        };

        if self.sandbox_enabled {
            let workspace = self.workspace.canonicalize().unwrap_or_else(|_| self.workspace.clone());
            if !resolved.starts_with(&workspace) {
                debug!(?resolved, "validate_path: sandbox violation");
                return Err(ToolError::SandboxViolation {
                    path: path.to_path_buf(),
                    workspace: self.workspace.clone(),
                });
            }
        } else if policy::blocked_path(&resolved) {
            return Err(ToolError::BlockedPath(resolved));
        }

        Ok(resolved)
    }

    /// Report an upcoming mutation to the checkpoint scope. Must be called
    /// before the file is touched so old content can be captured.
    pub async fn track_mutation(&self, path: &Path, change_type: ChangeType) {
        if let Some((store, session_id)) = &self.checkpoint {
            debug!(path = %path.display(), %change_type, "track_mutation: called");
            if let Err(e) = store.track(session_id, path, change_type).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to track mutation");
            }
        }
    }

    /// Report the bytes a completed mutation left behind
    pub async fn record_new_content(&self, path: &Path, content: &str) {
        if let Some((store, session_id)) = &self.checkpoint {
            if let Err(e) = store.update_change_content(session_id, path, content).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to record new content");
            }
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("workspace", &self.workspace)
            .field("run_id", &self.run_id)
            .field("sandbox_enabled", &self.sandbox_enabled)
            .finish()
    }
}
