//! Semantic index over a source tree
//!
//! Per-file symbol records extracted with language-agnostic regex families
//! (function definitions, class/struct definitions, imports, exports, keyword
//! hits). The index is capacity-bounded with least-recently-touched eviction
//! and persists to a gzip-compressed JSON file with a freshness window.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use eyre::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{IGNORED_DIRS, INDEX_FRESHNESS_SECS, MAX_INDEX_ENTRIES, SOURCE_EXTENSIONS};

/// Files larger than this are skipped during indexing
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Fixed keyword vocabulary scanned during extraction
pub const KEYWORD_VOCABULARY: &[&str] = &[
    "auth", "config", "database", "cache", "server", "client", "error", "test", "api", "http", "token", "session",
    "parse", "router", "stream", "queue",
];

static FUNCTION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap(),
        Regex::new(r"(?m)(?:^|\s)function\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap(),
        Regex::new(r"(?m)^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap(),
        Regex::new(r"(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s+)?\([^)]*\)\s*=>").unwrap(),
    ]
});

static CLASS_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap(),
        Regex::new(r"\b(?:struct|enum|trait|interface)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap(),
    ]
});

static IMPORT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#"import\s+[^;\n]*?from\s+['"]([^'"]+)['"]"#).unwrap(),
        Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
        Regex::new(r"(?m)^\s*use\s+([A-Za-z_][A-Za-z0-9_:]*)").unwrap(),
        Regex::new(r"(?m)^\s*from\s+([A-Za-z_][\w.]*)\s+import").unwrap(),
    ]
});

static EXPORT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r"export\s+(?:default\s+)?(?:async\s+)?(?:class|function|const|let|var|interface|enum)?\s*([A-Za-z_$][A-Za-z0-9_$]*)",
        )
        .unwrap(),
        Regex::new(r"(?m)^\s*pub\s+(?:async\s+)?(?:fn|struct|enum|trait|const|mod)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .unwrap(),
    ]
});

/// Content hash for change detection (not cryptographic)
pub fn content_hash(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Per-file index record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the index root
    pub path: PathBuf,

    /// Content hash at extraction time
    pub content_hash: String,

    /// Last-modified timestamp (unix ms)
    pub modified_ms: i64,

    /// Extracted function names
    pub functions: Vec<String>,

    /// Extracted class/struct/trait names
    pub classes: Vec<String>,

    /// Import specifiers
    pub imports: Vec<String>,

    /// Export names
    pub exports: Vec<String>,

    /// Keyword vocabulary hits
    pub keywords: Vec<String>,

    /// Recency counter for eviction ordering
    #[serde(default)]
    touched: u64,
}

impl IndexEntry {
    /// Extract symbols from file content
    fn extract(path: PathBuf, content: &str, modified_ms: i64) -> Self {
        let capture_all = |res: &[Regex]| -> Vec<String> {
            let mut names = Vec::new();
            for re in res {
                for cap in re.captures_iter(content) {
                    if let Some(m) = cap.get(1) {
                        let name = m.as_str().to_string();
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
            }
            names
        };

        let lower = content.to_lowercase();
        let keywords = KEYWORD_VOCABULARY
            .iter()
            .filter(|kw| lower.contains(**kw))
            .map(|kw| kw.to_string())
            .collect();

        Self {
            path,
            content_hash: content_hash(content.as_bytes()),
            modified_ms,
            functions: capture_all(&FUNCTION_RES),
            classes: capture_all(&CLASS_RES),
            imports: capture_all(&IMPORT_RES),
            exports: capture_all(&EXPORT_RES),
            keywords,
            touched: 0,
        }
    }
}

/// Serialized form written to the gzip cache file
#[derive(Debug, Serialize, Deserialize)]
struct SavedIndex {
    built_at_ms: i64,
    clock: u64,
    entries: Vec<IndexEntry>,
}

/// Capacity-bounded symbol index keyed by relative path
#[derive(Debug)]
pub struct SemanticIndex {
    root: PathBuf,
    entries: HashMap<PathBuf, IndexEntry>,
    max_entries: usize,
    clock: u64,
    built_at_ms: i64,
}

impl SemanticIndex {
    /// Create an empty index for a workspace root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
            max_entries: MAX_INDEX_ENTRIES,
            clock: 0,
            built_at_ms: 0,
        }
    }

    /// Create an empty index with a custom capacity (tests)
    pub fn with_capacity(root: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::new(root)
        }
    }

    /// Number of indexed files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Workspace root this index covers
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and (re)index every source file
    pub fn build(&mut self) -> Result<usize> {
        debug!(root = %self.root.display(), "build: called");
        let mut indexed = 0usize;

        let root = self.root.clone();
        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !is_ignored_dir(e.path()))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !has_source_extension(path) {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                debug!(path = %path.display(), "build: skipping oversized or unreadable file");
                continue;
            }

            if self.index_file(path)? {
                indexed += 1;
            }
        }

        self.built_at_ms = chrono::Utc::now().timestamp_millis();
        info!(indexed, total = self.entries.len(), "Semantic index built");
        Ok(indexed)
    }

    /// Index or refresh a single file. Returns true if the entry changed.
    pub fn index_file(&mut self, path: &Path) -> Result<bool> {
        let rel = self.relative(path);
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let hash = content_hash(content.as_bytes());

        if let Some(existing) = self.entries.get(&rel)
            && existing.content_hash == hash
        {
            debug!(path = %rel.display(), "index_file: unchanged");
            return Ok(false);
        }

        let modified_ms = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let mut entry = IndexEntry::extract(rel.clone(), &content, modified_ms);
        self.clock += 1;
        entry.touched = self.clock;
        self.entries.insert(rel, entry);
        self.evict_over_capacity();
        Ok(true)
    }

    /// Look up an entry, bumping its recency
    pub fn touch(&mut self, path: &Path) -> Option<&IndexEntry> {
        let rel = self.relative(path);
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(&rel).map(|e| {
            e.touched = clock;
            &*e
        })
    }

    /// Look up an entry without touching it
    pub fn get(&self, path: &Path) -> Option<&IndexEntry> {
        let rel = self.relative(path);
        self.entries.get(&rel)
    }

    /// Iterate all entries
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Drop the entry for a path (mutation invalidation)
    pub fn remove(&mut self, path: &Path) -> bool {
        let rel = self.relative(path);
        self.entries.remove(&rel).is_some()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.built_at_ms = 0;
    }

    /// Whether the index was built within the freshness window
    pub fn is_fresh(&self) -> bool {
        let age_secs = (chrono::Utc::now().timestamp_millis() - self.built_at_ms) / 1000;
        self.built_at_ms > 0 && age_secs < INDEX_FRESHNESS_SECS
    }

    /// Persist to a gzip-compressed JSON file
    pub fn save(&self, cache_path: &Path) -> Result<()> {
        debug!(path = %cache_path.display(), entries = self.entries.len(), "save: called");
        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let saved = SavedIndex {
            built_at_ms: self.built_at_ms,
            clock: self.clock,
            entries: self.entries.values().cloned().collect(),
        };

        let json = serde_json::to_vec(&saved)?;
        let file = std::fs::File::create(cache_path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?;
        Ok(())
    }

    /// Load from the gzip cache if present and within the freshness window
    pub fn load(root: impl Into<PathBuf>, cache_path: &Path) -> Option<Self> {
        let file = std::fs::File::open(cache_path).ok()?;
        let mut decoder = GzDecoder::new(file);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json).ok()?;

        let saved: SavedIndex = match serde_json::from_slice(&json) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable semantic index cache");
                return None;
            }
        };

        let mut index = Self::new(root);
        index.built_at_ms = saved.built_at_ms;
        index.clock = saved.clock;
        for entry in saved.entries {
            index.entries.insert(entry.path.clone(), entry);
        }

        if !index.is_fresh() {
            debug!("load: cached index is stale");
            return None;
        }

        info!(entries = index.entries.len(), "Loaded semantic index from cache");
        Some(index)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }

    fn evict_over_capacity(&mut self) {
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .values()
                .min_by_key(|e| e.touched)
                .map(|e| e.path.clone());
            match oldest {
                Some(path) => {
                    debug!(path = %path.display(), "evict_over_capacity: evicting");
                    self.entries.remove(&path);
                }
                None => break,
            }
        }
    }
}

fn is_ignored_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| IGNORED_DIRS.contains(&name))
        .unwrap_or(false)
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_extract_rust_symbols() {
        let entry = IndexEntry::extract(
            PathBuf::from("lib.rs"),
            "use std::fmt;\npub fn authenticate(user: &str) {}\npub struct Session;\n",
            0,
        );

        assert!(entry.functions.contains(&"authenticate".to_string()));
        assert!(entry.classes.contains(&"Session".to_string()));
        assert!(entry.imports.iter().any(|i| i.starts_with("std")));
        assert!(entry.keywords.contains(&"auth".to_string()));
    }

    #[test]
    fn test_extract_js_symbols() {
        let entry = IndexEntry::extract(
            PathBuf::from("auth.ts"),
            "import { db } from './db';\nexport function login(user) {}\nconst verify = async (t) => t;\n",
            0,
        );

        assert!(entry.functions.contains(&"login".to_string()));
        assert!(entry.functions.contains(&"verify".to_string()));
        assert!(entry.imports.contains(&"./db".to_string()));
        assert!(entry.exports.contains(&"login".to_string()));
    }

    #[test]
    fn test_build_skips_ignored_dirs() {
        let temp = tempdir().unwrap();
        write_file(temp.path(), "src/main.rs", "fn main() {}");
        write_file(temp.path(), "node_modules/dep/index.js", "function hidden() {}");

        let mut index = SemanticIndex::new(temp.path());
        index.build().unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.get(&temp.path().join("src/main.rs")).is_some());
    }

    #[test]
    fn test_reindex_unchanged_is_noop() {
        let temp = tempdir().unwrap();
        let path = write_file(temp.path(), "a.rs", "fn one() {}");

        let mut index = SemanticIndex::new(temp.path());
        assert!(index.index_file(&path).unwrap());
        assert!(!index.index_file(&path).unwrap());

        std::fs::write(&path, "fn two() {}").unwrap();
        assert!(index.index_file(&path).unwrap());
    }

    #[test]
    fn test_capacity_evicts_least_recently_touched() {
        let temp = tempdir().unwrap();
        let a = write_file(temp.path(), "a.rs", "fn a() {}");
        let b = write_file(temp.path(), "b.rs", "fn b() {}");
        let c = write_file(temp.path(), "c.rs", "fn c() {}");

        let mut index = SemanticIndex::with_capacity(temp.path(), 2);
        index.index_file(&a).unwrap();
        index.index_file(&b).unwrap();

        // Touch a so b is the eviction candidate
        index.touch(&a);
        index.index_file(&c).unwrap();

        assert_eq!(index.len(), 2);
        assert!(index.get(&a).is_some());
        assert!(index.get(&b).is_none());
        assert!(index.get(&c).is_some());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = tempdir().unwrap();
        let file = write_file(temp.path(), "a.rs", "pub fn roundtrip() {}");
        let cache = temp.path().join("cache/semantic-index.json.gz");

        let mut index = SemanticIndex::new(temp.path());
        index.index_file(&file).unwrap();
        index.built_at_ms = chrono::Utc::now().timestamp_millis();
        index.save(&cache).unwrap();

        let loaded = SemanticIndex::load(temp.path(), &cache).expect("fresh cache should load");
        assert_eq!(loaded.len(), 1);
        assert!(
            loaded
                .get(&temp.path().join("a.rs"))
                .unwrap()
                .functions
                .contains(&"roundtrip".to_string())
        );
    }

    #[test]
    fn test_load_rejects_stale_cache() {
        let temp = tempdir().unwrap();
        let file = write_file(temp.path(), "a.rs", "fn stale() {}");
        let cache = temp.path().join("index.json.gz");

        let mut index = SemanticIndex::new(temp.path());
        index.index_file(&file).unwrap();
        // Built two hours ago
        index.built_at_ms = chrono::Utc::now().timestamp_millis() - 2 * 3600 * 1000;
        index.save(&cache).unwrap();

        assert!(SemanticIndex::load(temp.path(), &cache).is_none());
    }
}
