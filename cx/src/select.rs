//! Query-relevant file selection under a token budget
//!
//! Scores every indexed file against a free-form query and greedily admits
//! files in descending score order while the running token total stays within
//! budget.

use std::path::{Path, PathBuf};

use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::index::KEYWORD_VOCABULARY;
use crate::tokens::estimate_tokens;
use crate::{FileCache, SOURCE_EXTENSIONS, SemanticIndex};

/// Selection request
#[derive(Debug, Clone)]
pub struct SelectRequest {
    /// Free-form relevance query
    pub query: String,

    /// Token budget for the whole selection
    pub max_tokens: usize,

    /// Optional glob patterns a file path must match
    pub include_patterns: Vec<String>,

    /// Optional glob patterns that exclude a file
    pub exclude_patterns: Vec<String>,

    /// Apply the recency multiplier
    pub prioritize_recent: bool,

    /// Minimum score for admission
    pub min_relevance: f64,
}

impl Default for SelectRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_tokens: 8000,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            prioritize_recent: true,
            min_relevance: 0.0,
        }
    }
}

/// One scored file in a selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileScore {
    /// Path relative to the workspace root
    pub path: PathBuf,

    /// Relevance score in [0, 1]
    pub score: f64,

    /// Why the file matched
    pub match_reasons: Vec<String>,

    /// Estimated token cost of including the file
    pub token_count: usize,
}

/// Result of `select_relevant_files`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Admitted files, descending score order
    pub files: Vec<FileScore>,

    /// Sum of admitted token counts (≤ the request budget)
    pub total_tokens: usize,

    /// Files that scored above the floor but did not fit the budget
    pub skipped: Vec<PathBuf>,
}

/// A symbol-level search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub path: PathBuf,
    pub symbol: String,
    pub kind: SymbolKind,
    pub score: f64,
}

/// What kind of symbol matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Import,
    Export,
}

/// A chunk of a large file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunk {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub tokens: usize,
}

/// Context manager: semantic index + file cache over one workspace root
pub struct ContextManager {
    root: PathBuf,
    index: SemanticIndex,
    cache: FileCache,
    cache_path: PathBuf,
}

impl ContextManager {
    /// Open a context manager for a workspace root, reusing a fresh on-disk
    /// index when one exists.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let cache_path = root.join(".vibe").join("cache").join("semantic-index.json.gz");

        let index = SemanticIndex::load(&root, &cache_path).unwrap_or_else(|| SemanticIndex::new(&root));

        Ok(Self {
            root,
            index,
            cache: FileCache::new(),
            cache_path,
        })
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Direct access to the index (read-only)
    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Build the index if it is empty or stale, persisting the result
    pub fn ensure_index(&mut self) -> Result<()> {
        if self.index.is_empty() || !self.index.is_fresh() {
            debug!("ensure_index: rebuilding");
            self.index.build()?;
            self.index.save(&self.cache_path)?;
        }
        Ok(())
    }

    /// Score and select files under the token budget
    pub fn select_relevant_files(&mut self, request: &SelectRequest) -> Result<Selection> {
        debug!(query = %request.query, max_tokens = request.max_tokens, "select_relevant_files: called");
        self.ensure_index()?;

        let include = compile_globs(&request.include_patterns)?;
        let exclude = compile_globs(&request.exclude_patterns)?;

        let mut scored: Vec<FileScore> = Vec::new();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let candidates: Vec<(PathBuf, f64, Vec<String>, i64)> = self
            .index
            .entries()
            .filter(|entry| {
                let path_str = entry.path.to_string_lossy();
                let included = include.is_empty() || include.iter().any(|g| g.matches(&path_str));
                let excluded = exclude.iter().any(|g| g.matches(&path_str));
                included && !excluded
            })
            .map(|entry| {
                let (score, reasons) = score_entry(&request.query, entry);
                (entry.path.clone(), score, reasons, entry.modified_ms)
            })
            .collect();

        for (path, base_score, reasons, modified_ms) in candidates {
            let score = if request.prioritize_recent {
                (base_score * recency_multiplier(now_ms, modified_ms)).clamp(0.0, 1.0)
            } else {
                base_score
            };

            if score < request.min_relevance || score <= 0.0 {
                continue;
            }

            let abs = self.root.join(&path);
            let Ok(content) = self.cache.read(&abs) else {
                continue;
            };

            scored.push(FileScore {
                path,
                score,
                match_reasons: reasons,
                token_count: estimate_tokens(&content).total,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut selection = Selection::default();
        for file in scored {
            if selection.total_tokens + file.token_count <= request.max_tokens {
                selection.total_tokens += file.token_count;
                selection.files.push(file);
            } else {
                selection.skipped.push(file.path);
            }
        }

        info!(
            selected = selection.files.len(),
            skipped = selection.skipped.len(),
            total_tokens = selection.total_tokens,
            "Context selection complete"
        );
        Ok(selection)
    }

    /// Split a file into chunks each under `max_tokens * 0.8`, annotated with
    /// their line ranges. Returns a lazy iterator over chunks.
    pub fn split_large_file(&mut self, path: &Path, max_tokens: usize) -> Result<impl Iterator<Item = FileChunk>> {
        let abs = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        let content = self.cache.read(&abs)?;
        let budget = (max_tokens as f64 * 0.8) as usize;

        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        Ok(ChunkIter {
            lines,
            budget: budget.max(1),
            cursor: 0,
        })
    }

    /// Symbol-level search against the index
    pub fn semantic_search(
        &mut self,
        query: &str,
        files: Option<&[PathBuf]>,
        max_results: usize,
        min_score: f64,
    ) -> Result<Vec<SymbolMatch>> {
        debug!(%query, max_results, "semantic_search: called");
        self.ensure_index()?;

        let needle = query.to_lowercase();
        let mut matches = Vec::new();

        for entry in self.index.entries() {
            if let Some(filter) = files
                && !filter.iter().any(|f| entry.path == *f || entry.path.ends_with(f))
            {
                continue;
            }

            let mut push = |symbol: &str, kind: SymbolKind, weight: f64| {
                let sym_lower = symbol.to_lowercase();
                if sym_lower.contains(&needle) {
                    // Exact matches outrank substring matches
                    let score = if sym_lower == needle { weight } else { weight * 0.7 };
                    if score >= min_score {
                        matches.push(SymbolMatch {
                            path: entry.path.clone(),
                            symbol: symbol.to_string(),
                            kind,
                            score,
                        });
                    }
                }
            };

            for f in &entry.functions {
                push(f, SymbolKind::Function, 1.0);
            }
            for c in &entry.classes {
                push(c, SymbolKind::Class, 0.9);
            }
            for e in &entry.exports {
                push(e, SymbolKind::Export, 0.8);
            }
            for i in &entry.imports {
                push(i, SymbolKind::Import, 0.6);
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(max_results);
        Ok(matches)
    }

    /// Invalidate one path or the whole cache + index
    pub fn invalidate(&mut self, path: Option<&Path>) {
        match path {
            Some(p) => {
                debug!(path = %p.display(), "invalidate: single path");
                let abs = if p.is_absolute() { p.to_path_buf() } else { self.root.join(p) };
                self.cache.remove(&abs);
                self.index.remove(p);
            }
            None => {
                debug!("invalidate: full clear");
                self.cache.clear();
                self.index.clear();
            }
        }
    }
}

struct ChunkIter {
    lines: Vec<String>,
    budget: usize,
    cursor: usize,
}

impl Iterator for ChunkIter {
    type Item = FileChunk;

    fn next(&mut self) -> Option<FileChunk> {
        if self.cursor >= self.lines.len() {
            return None;
        }

        let start = self.cursor;
        let mut content = String::new();
        let mut tokens = 0usize;

        while self.cursor < self.lines.len() {
            let line = &self.lines[self.cursor];
            let line_tokens = estimate_tokens(line).total + 1;
            if tokens > 0 && tokens + line_tokens > self.budget {
                break;
            }
            content.push_str(line);
            content.push('\n');
            tokens += line_tokens;
            self.cursor += 1;
        }

        Some(FileChunk {
            content,
            start_line: start + 1,
            end_line: self.cursor,
            tokens,
        })
    }
}

/// Score one index entry against a query per the fixed formula:
/// path keyword 0.3, function-name match up to 0.4, import match up to 0.2,
/// 0.1 per vocabulary keyword hit, 0.05 for a source extension; clamped to 1.
fn score_entry(query: &str, entry: &crate::IndexEntry) -> (f64, Vec<String>) {
    let mut score = 0.0f64;
    let mut reasons = Vec::new();

    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    let path_str = entry.path.to_string_lossy().to_lowercase();

    if terms.iter().any(|t| path_str.contains(t)) {
        score += 0.3;
        reasons.push("path matches query".to_string());
    }

    if let Some(f) = entry
        .functions
        .iter()
        .find(|f| terms.iter().any(|t| f.to_lowercase().contains(t)))
    {
        score += 0.4;
        reasons.push(format!("function '{}' matches", f));
    }

    if let Some(i) = entry
        .imports
        .iter()
        .find(|i| terms.iter().any(|t| i.to_lowercase().contains(t)))
    {
        score += 0.2;
        reasons.push(format!("imports '{}'", i));
    }

    let keyword_hits = KEYWORD_VOCABULARY
        .iter()
        .filter(|kw| query_lower.contains(**kw) && entry.keywords.iter().any(|k| k == **kw))
        .count();
    if keyword_hits > 0 {
        score += 0.1 * keyword_hits as f64;
        reasons.push(format!("{} keyword hits", keyword_hits));
    }

    let is_source = entry
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false);
    if is_source {
        score += 0.05;
    }

    (score.clamp(0.0, 1.0), reasons)
}

/// Recency multiplier: today ×1.3, this week ×1.2, this month ×1.1
fn recency_multiplier(now_ms: i64, modified_ms: i64) -> f64 {
    const DAY_MS: i64 = 24 * 3600 * 1000;
    let age = now_ms - modified_ms;

    if age < DAY_MS {
        1.3
    } else if age < 7 * DAY_MS {
        1.2
    } else if age < 30 * DAY_MS {
        1.1
    } else {
        1.0
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(|e| eyre::eyre!("Invalid glob pattern '{}': {}", p, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn workspace() -> (tempfile::TempDir, ContextManager) {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(
            temp.path().join("src/auth.rs"),
            "use session::Token;\npub fn authenticate(user: &str) -> bool { true }\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join("src/render.rs"),
            "pub fn draw_frame(buffer: &mut [u8]) {}\n",
        )
        .unwrap();
        let manager = ContextManager::open(temp.path()).unwrap();
        (temp, manager)
    }

    #[test]
    fn test_selection_respects_budget() {
        let (_temp, mut manager) = workspace();

        let selection = manager
            .select_relevant_files(&SelectRequest {
                query: "auth".to_string(),
                max_tokens: 10_000,
                ..Default::default()
            })
            .unwrap();

        assert!(selection.total_tokens <= 10_000);
        let total: usize = selection.files.iter().map(|f| f.token_count).sum();
        assert_eq!(total, selection.total_tokens);
    }

    #[test]
    fn test_relevant_file_ranked_first_with_reasons() {
        let (_temp, mut manager) = workspace();

        let selection = manager
            .select_relevant_files(&SelectRequest {
                query: "auth".to_string(),
                max_tokens: 10_000,
                ..Default::default()
            })
            .unwrap();

        assert!(!selection.files.is_empty());
        let first = &selection.files[0];
        assert_eq!(first.path, PathBuf::from("src/auth.rs"));
        assert!(first.match_reasons.iter().any(|r| r.contains("auth")));
    }

    #[test]
    fn test_tiny_budget_skips_files() {
        let (_temp, mut manager) = workspace();

        let selection = manager
            .select_relevant_files(&SelectRequest {
                query: "auth".to_string(),
                max_tokens: 1,
                ..Default::default()
            })
            .unwrap();

        assert!(selection.files.is_empty());
        assert!(!selection.skipped.is_empty());
        assert_eq!(selection.total_tokens, 0);
    }

    #[test]
    fn test_split_large_file_chunks_under_budget() {
        let temp = tempdir().unwrap();
        let body: String = (0..200).map(|i| format!("line number {i} with some padding\n")).collect();
        std::fs::write(temp.path().join("big.rs"), &body).unwrap();

        let mut manager = ContextManager::open(temp.path()).unwrap();
        let chunks: Vec<FileChunk> = manager
            .split_large_file(Path::new("big.rs"), 100)
            .unwrap()
            .collect();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.tokens <= 80, "chunk tokens {} over budget", chunk.tokens);
            assert!(chunk.start_line <= chunk.end_line);
        }
        assert_eq!(chunks.first().unwrap().start_line, 1);
        assert_eq!(chunks.last().unwrap().end_line, 200);
    }

    #[test]
    fn test_semantic_search_finds_symbol() {
        let (_temp, mut manager) = workspace();

        let matches = manager.semantic_search("authenticate", None, 10, 0.0).unwrap();

        assert!(!matches.is_empty());
        assert_eq!(matches[0].symbol, "authenticate");
        assert_eq!(matches[0].kind, SymbolKind::Function);
    }

    #[test]
    fn test_invalidate_single_path() {
        let (temp, mut manager) = workspace();
        manager.ensure_index().unwrap();
        assert!(manager.index().get(Path::new("src/auth.rs")).is_some());

        manager.invalidate(Some(Path::new("src/auth.rs")));
        assert!(manager.index().get(Path::new("src/auth.rs")).is_none());

        drop(temp);
    }

    #[test]
    fn test_recency_multiplier_brackets() {
        let now = chrono::Utc::now().timestamp_millis();
        assert_eq!(recency_multiplier(now, now), 1.3);
        assert_eq!(recency_multiplier(now, now - 3 * 24 * 3600 * 1000), 1.2);
        assert_eq!(recency_multiplier(now, now - 20 * 24 * 3600 * 1000), 1.1);
        assert_eq!(recency_multiplier(now, now - 60 * 24 * 3600 * 1000), 1.0);
    }
}
