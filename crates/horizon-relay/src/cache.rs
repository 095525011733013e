//! The cache capability consumed by the interceptor chain.
//!
//! The chain only needs to read and write whole operation results by key
//! and to tell a miss apart from a failure. Record normalization and storage
//! format belong to the [`NormalizedCache`] implementation.
//!
//! # Example
//!
//! ```ignore
//! use horizon_relay::cache::{CacheRead, MemoryCache, MemoryCacheConfig, NormalizedCache};
//!
//! let cache = MemoryCache::new(MemoryCacheConfig::default().with_max_entries(500));
//! cache.write("Hero({})", serde_json::json!({"hero": {"name": "R2-D2"}}))?;
//!
//! match cache.read("Hero({})")? {
//!     CacheRead::Hit(data) => println!("cached: {data}"),
//!     CacheRead::Miss => println!("not cached"),
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;

use parking_lot::Mutex;
use serde_json::Value;

use horizon_relay_core::logging::targets;

use crate::error::Result;

/// The outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    /// The key was present.
    Hit(Value),
    /// The key was absent.
    Miss,
}

impl CacheRead {
    /// Check if this is a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// The cached value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss => None,
        }
    }
}

/// A shared store of operation results.
///
/// Implementations must be safe for concurrent reads and writes and must
/// not block for long; the chain calls them from async context.
pub trait NormalizedCache: Send + Sync {
    /// Read the value stored under `key`.
    fn read(&self, key: &str) -> Result<CacheRead>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: Value) -> Result<()>;

    /// Remove every entry.
    fn clear(&self) {}
}

/// Configuration for [`MemoryCache`].
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries. The oldest entry is evicted first.
    /// Default: 1000.
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

impl MemoryCacheConfig {
    /// Set the maximum number of entries.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

#[derive(Default)]
struct MemoryCacheState {
    entries: HashMap<String, Value>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

/// An in-memory [`NormalizedCache`].
///
/// Stores whole results keyed by operation cache key and evicts in
/// insertion order once full.
pub struct MemoryCache {
    config: MemoryCacheConfig,
    state: Mutex<MemoryCacheState>,
}

impl MemoryCache {
    /// Create a cache with the given configuration.
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MemoryCacheState::default()),
        }
    }

    /// Get the number of entries in the cache.
    #[inline]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Get the cache hit count.
    pub fn hits(&self) -> u64 {
        self.state.lock().hits
    }

    /// Get the cache miss count.
    pub fn misses(&self) -> u64 {
        self.state.lock().misses
    }

    /// Remove one entry, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let value = state.entries.remove(key)?;
        state.order.retain(|k| k != key);
        Some(value)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl NormalizedCache for MemoryCache {
    fn read(&self, key: &str) -> Result<CacheRead> {
        let mut state = self.state.lock();
        match state.entries.get(key).cloned() {
            Some(value) => {
                state.hits += 1;
                Ok(CacheRead::Hit(value))
            }
            None => {
                state.misses += 1;
                Ok(CacheRead::Miss)
            }
        }
    }

    fn write(&self, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.lock();
        if state.entries.insert(key.to_string(), value).is_none() {
            state.order.push_back(key.to_string());
        }
        while state.entries.len() > self.config.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            tracing::trace!(target: targets::CACHE, key = %oldest, "Evicted cache entry");
        }
        Ok(())
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryCache")
            .field("entries", &state.entries.len())
            .field("max_entries", &self.config.max_entries)
            .field("hits", &state.hits)
            .field("misses", &state.misses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_write() {
        let cache = MemoryCache::default();
        assert_eq!(cache.read("a").unwrap(), CacheRead::Miss);

        cache.write("a", json!({"x": 1})).unwrap();
        assert_eq!(cache.read("a").unwrap(), CacheRead::Hit(json!({"x": 1})));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_overwrite_keeps_one_entry() {
        let cache = MemoryCache::default();
        cache.write("a", json!(1)).unwrap();
        cache.write("a", json!(2)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.read("a").unwrap().into_value(), Some(json!(2)));
    }

    #[test]
    fn test_eviction_order() {
        let cache = MemoryCache::new(MemoryCacheConfig::default().with_max_entries(2));
        cache.write("a", json!(1)).unwrap();
        cache.write("b", json!(2)).unwrap();
        cache.write("c", json!(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.read("a").unwrap().is_hit());
        assert!(cache.read("c").unwrap().is_hit());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryCache::default();
        cache.write("a", json!(1)).unwrap();
        cache.write("b", json!(2)).unwrap();

        assert_eq!(cache.remove("a"), Some(json!(1)));
        assert_eq!(cache.remove("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }
}
