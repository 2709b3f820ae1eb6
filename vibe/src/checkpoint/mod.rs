//! Checkpoint store
//!
//! Gives a sequence of mutating tool invocations transactional semantics:
//! either all changes are retained or all are reverted.

mod store;
mod types;

pub use store::CheckpointStore;
pub use types::{ChangeType, Checkpoint, FileChange, RollbackReport};

use thiserror::Error;

/// Errors from the checkpoint store
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
