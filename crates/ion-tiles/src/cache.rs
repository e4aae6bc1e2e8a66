//! Byte caches for fetched tileset documents.
//!
//! The client stores raw response bodies keyed by a credential-free URL so
//! that re-selecting an asset does not hit the network again.
//!
//! # Implementations
//!
//! - [`MemoryCache`]: In-memory least-recently-used cache with an optional byte limit
//! - [`NoCache`]: Passthrough implementation that caches nothing

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::error::{Error, Result};

/// A cache for storing fetched bytes.
///
/// Keys never contain access tokens; see [`cache_key`].
pub trait Cache: Send + Sync {
    /// Get data from the cache.
    ///
    /// Returns `Ok(Some(data))` if the data is cached and `Ok(None)` if not.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store data in the cache.
    fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Remove data from the cache.
    fn remove(&self, key: &str) -> Result<()>;

    /// Clear all cached data.
    fn clear(&self) -> Result<()>;
}

/// Strip credential query parameters from a URL so it can be used as a cache key.
///
/// Access tokens rotate, so two fetches of the same document would otherwise
/// never share an entry.
#[must_use]
pub fn cache_key(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let name = pair.split('=').next().unwrap_or_default();
            !matches!(name, "access_token" | "key" | "session")
        })
        .filter(|pair| !pair.is_empty())
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

/// A cache that stores nothing (passthrough).
#[derive(Debug, Clone, Default)]
pub struct NoCache;

impl NoCache {
    /// Create a new no-op cache.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// An in-memory cache.
///
/// Entries are evicted least-recently-used first once the optional byte limit
/// is exceeded. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Arc<RwLock<MemoryCacheInner>>,
    max_size: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Vec<u8>>,
    /// Keys ordered from least to most recently used.
    recency: VecDeque<String>,
    current_size: usize,
}

impl MemoryCacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(index) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(index) {
                self.recency.push_back(k);
            }
        }
    }

    fn evict(&mut self, key: &str) {
        if let Some(data) = self.entries.remove(key) {
            self.current_size -= data.len();
            self.recency.retain(|k| k != key);
        }
    }
}

impl MemoryCache {
    /// Create a new memory cache with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_size: None,
        }
    }

    /// Create a new memory cache with a maximum size in bytes.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_size: Some(max_size),
        }
    }

    /// Get the current size of cached data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().map_or(0, |inner| inner.current_size)
    }

    /// Get the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map_or(0, |inner| inner.entries.len())
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryCacheInner>> {
        self.inner.read().map_err(|e| Error::Cache {
            operation: "read",
            message: e.to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryCacheInner>> {
        self.inner.write().map_err(|e| Error::Cache {
            operation: "write",
            message: e.to_string(),
        })
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.write()?;
        let data = inner.entries.get(key).cloned();
        if data.is_some() {
            inner.touch(key);
        }
        Ok(data)
    }

    fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let mut inner = self.write()?;
        inner.evict(key);

        let data_size = data.len();
        if let Some(max_size) = self.max_size {
            if data_size > max_size {
                tracing::debug!(key, data_size, max_size, "entry larger than cache, skipping");
                return Ok(());
            }
            while inner.current_size + data_size > max_size {
                let Some(oldest) = inner.recency.front().cloned() else {
                    break;
                };
                inner.evict(&oldest);
            }
        }

        inner.entries.insert(key.to_string(), data);
        inner.recency.push_back(key.to_string());
        inner.current_size += data_size;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write()?.evict(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.entries.clear();
        inner.recency.clear();
        inner.current_size = 0;
        Ok(())
    }
}
