//! File-content cache with entry, byte, and TTL bounds
//!
//! LRU over two ceilings: an entry count and a memory budget measured as the
//! byte length of stored content. Access promotes an entry to most-recent;
//! entries older than the TTL are treated as absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::{CACHE_TTL_SECS, MAX_CACHE_BYTES, MAX_CACHE_ENTRIES};

struct CacheEntry {
    content: String,
    bytes: usize,
    inserted: Instant,
    last_access: u64,
}

/// Cache hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded LRU file-content cache
pub struct FileCache {
    entries: HashMap<PathBuf, CacheEntry>,
    max_entries: usize,
    max_bytes: usize,
    ttl: Duration,
    bytes: usize,
    clock: u64,
    stats: CacheStats,
}

impl FileCache {
    /// Create a cache with the default bounds
    pub fn new() -> Self {
        Self::with_bounds(MAX_CACHE_ENTRIES, MAX_CACHE_BYTES, Duration::from_secs(CACHE_TTL_SECS))
    }

    /// Create a cache with explicit bounds (tests)
    pub fn with_bounds(max_entries: usize, max_bytes: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            max_bytes,
            ttl,
            bytes: 0,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently accounted to cached content
    pub fn memory(&self) -> usize {
        self.bytes
    }

    /// Hit/miss/eviction counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Fetch a cached file, promoting it to most-recent
    pub fn get(&mut self, path: &Path) -> Option<&str> {
        let expired = match self.entries.get(path) {
            Some(entry) => entry.inserted.elapsed() > self.ttl,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if expired {
            debug!(path = %path.display(), "get: entry expired");
            self.remove(path);
            self.stats.misses += 1;
            return None;
        }

        self.clock += 1;
        let clock = self.clock;
        self.stats.hits += 1;
        self.entries.get_mut(path).map(|entry| {
            entry.last_access = clock;
            entry.content.as_str()
        })
    }

    /// Insert or replace a cached file, then evict until both bounds hold
    pub fn put(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        let bytes = content.len();

        if let Some(old) = self.entries.remove(&path) {
            self.bytes -= old.bytes;
        }

        self.clock += 1;
        self.entries.insert(
            path,
            CacheEntry {
                content,
                bytes,
                inserted: Instant::now(),
                last_access: self.clock,
            },
        );
        self.bytes += bytes;

        self.evict_to_bounds();
    }

    /// Remove a single entry (mutation invalidation)
    pub fn remove(&mut self, path: &Path) -> bool {
        match self.entries.remove(path) {
            Some(entry) => {
                self.bytes -= entry.bytes;
                true
            }
            None => false,
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    /// Read-through: fetch from cache or load from disk and cache
    pub fn read(&mut self, path: &Path) -> std::io::Result<String> {
        if let Some(content) = self.get(path) {
            return Ok(content.to_string());
        }

        let content = std::fs::read_to_string(path)?;
        self.put(path, content.clone());
        Ok(content)
    }

    fn evict_to_bounds(&mut self) {
        while self.entries.len() > self.max_entries || self.bytes > self.max_bytes {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(p, _)| p.clone());
            match oldest {
                Some(path) => {
                    debug!(path = %path.display(), "evict_to_bounds: evicting");
                    self.remove(&path);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let mut cache = FileCache::new();
        cache.put("a.rs", "fn a() {}");

        assert_eq!(cache.get(Path::new("a.rs")), Some("fn a() {}"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_entry_bound_holds() {
        let mut cache = FileCache::with_bounds(2, usize::MAX, Duration::from_secs(300));
        cache.put("a", "1");
        cache.put("b", "2");
        cache.put("c", "3");

        assert_eq!(cache.len(), 2);
        assert!(cache.get(Path::new("a")).is_none());
        assert!(cache.get(Path::new("c")).is_some());
    }

    #[test]
    fn test_byte_bound_holds() {
        let mut cache = FileCache::with_bounds(100, 10, Duration::from_secs(300));
        cache.put("a", "12345678");
        cache.put("b", "12345678");

        assert!(cache.memory() <= 10);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_access_promotes() {
        let mut cache = FileCache::with_bounds(2, usize::MAX, Duration::from_secs(300));
        cache.put("a", "1");
        cache.put("b", "2");

        // Promote a; inserting c should evict b
        assert!(cache.get(Path::new("a")).is_some());
        cache.put("c", "3");

        assert!(cache.get(Path::new("a")).is_some());
        assert!(cache.get(Path::new("b")).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = FileCache::with_bounds(10, usize::MAX, Duration::from_millis(0));
        cache.put("a", "1");
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get(Path::new("a")).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_replace_accounts_bytes() {
        let mut cache = FileCache::with_bounds(10, usize::MAX, Duration::from_secs(300));
        cache.put("a", "12345678");
        cache.put("a", "12");

        assert_eq!(cache.memory(), 2);
        assert_eq!(cache.len(), 1);
    }
}
