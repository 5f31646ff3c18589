//! Compiled path cache
//!
//! Parsing is cheap but NIF callers tend to run the same handful of paths
//! over many documents, so parsed queries are kept in a small LRU keyed by
//! the path text. Bound queries are not cached: binding mints per-stream
//! tag ids and roles.

use super::path::PathQuery;
use crate::error::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{LazyLock, Mutex};

pub const DEFAULT_CAPACITY: usize = 256;

pub struct QueryCache {
    entries: LruCache<String, PathQuery>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        QueryCache {
            entries: LruCache::new(capacity),
        }
    }

    /// Parse `path`, or return the cached parse. Parse errors are not cached.
    pub fn get_or_parse(&mut self, path: &str) -> Result<PathQuery> {
        if let Some(query) = self.entries.get(path) {
            return Ok(query.clone());
        }
        let query = PathQuery::parse(path)?;
        self.entries.put(path.to_string(), query.clone());
        Ok(query)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

static CACHE: LazyLock<Mutex<QueryCache>> = LazyLock::new(|| Mutex::new(QueryCache::default()));

/// Parse `path` through the process-wide cache
pub fn compile(path: &str) -> Result<PathQuery> {
    match CACHE.lock() {
        Ok(mut cache) => cache.get_or_parse(path),
        // A panic while holding the lock leaves a usable cache behind
        Err(poisoned) => poisoned.into_inner().get_or_parse(path),
    }
}
