//! ContextKit - token-budgeted workspace context selection
//!
//! Builds a semantic index over a source tree and selects a query-relevant,
//! token-bounded slice of files for injection into an LLM prompt.
//!
//! # Architecture
//!
//! ```text
//! .vibe/
//! └── cache/
//!     └── semantic-index.json.gz   # serialized index + build timestamp
//! ```
//!
//! # Example
//!
//! ```ignore
//! use contextkit::{ContextManager, SelectRequest};
//!
//! let mut manager = ContextManager::open(".")?;
//! let selection = manager.select_relevant_files(&SelectRequest {
//!     query: "auth".into(),
//!     max_tokens: 8000,
//!     ..Default::default()
//! })?;
//! ```

pub mod cache;
pub mod cli;
mod index;
mod select;
mod tokens;

pub use cache::{CacheStats, FileCache};
pub use index::{IndexEntry, SemanticIndex, content_hash};
pub use select::{ContextManager, FileChunk, FileScore, SelectRequest, Selection, SymbolMatch};
pub use tokens::{TokenEstimate, estimate_tokens};

/// Maximum number of entries held in the semantic index
pub const MAX_INDEX_ENTRIES: usize = 5000;

/// Maximum number of entries held in the file cache
pub const MAX_CACHE_ENTRIES: usize = 1000;

/// Maximum bytes held in the file cache (100 MB)
pub const MAX_CACHE_BYTES: usize = 100 * 1024 * 1024;

/// File cache entry time-to-live (5 minutes)
pub const CACHE_TTL_SECS: u64 = 300;

/// On-disk index freshness window (1 hour)
pub const INDEX_FRESHNESS_SECS: i64 = 3600;

/// Source file extensions considered during indexing and selection
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "py", "go", "java", "rb", "c", "cc", "cpp", "h", "hpp", "cs", "php",
    "swift", "kt", "scala",
];

/// Directory names always excluded from indexing
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "dist",
    "build",
    "out",
    "coverage",
    "__pycache__",
    ".next",
    ".vibe",
    "vendor",
];
