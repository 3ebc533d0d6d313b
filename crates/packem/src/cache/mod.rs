//! Persistent task cache.
//!
//! Content-addressed caching of task outputs so unchanged tasks skip the
//! bundler entirely.
//!
//! # Architecture
//!
//! - **Content-addressed**: keys are BLAKE3 hashes of the build fingerprint
//!   and the task descriptor (see [`BuildFingerprint`])
//! - **Namespaced**: entries are stored under the task's output subdirectory
//! - **Two layers**: an in-process map in front of a redb file
//!
//! Failures of the cache never fail a build: [`FileCache::load`] and
//! [`FileCache::store`] log at `warn` and carry on. The `try_*` variants
//! surface [`CacheError`] for callers that want it.

mod key;
mod storage;

pub use key::{BuildFingerprint, CACHE_FORMAT_VERSION, CacheKey, source_fingerprint};
pub use storage::{CacheError, CacheStore};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::group::TaskOutput;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A cached task result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTask {
    pub format_version: u32,
    /// Unix timestamp when the entry was written.
    pub created_at: u64,
    pub output: TaskOutput,
}

impl CachedTask {
    pub fn new(output: TaskOutput) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            output,
        }
    }
}

/// Memory layer over an optional redb store.
#[derive(Debug, Default)]
pub struct FileCache {
    memory: RwLock<FxHashMap<String, Arc<CachedTask>>>,
    store: Option<CacheStore>,
}

impl FileCache {
    /// Open the store under `cache_dir`; falls back to memory only when the
    /// database cannot be opened.
    pub fn open(cache_dir: &Path) -> Self {
        match CacheStore::open(cache_dir) {
            Ok(store) => Self {
                memory: RwLock::default(),
                store: Some(store),
            },
            Err(error) => {
                tracing::warn!(dir = %cache_dir.display(), %error, "file cache unavailable, using memory only");
                Self::memory_only()
            }
        }
    }

    pub fn memory_only() -> Self {
        Self::default()
    }

    fn slot(namespace: &str, key: &CacheKey) -> String {
        let namespace = if namespace.is_empty() { "." } else { namespace };
        format!("{namespace}:{key}")
    }

    pub fn try_load(&self, namespace: &str, key: &CacheKey) -> CacheResult<Arc<CachedTask>> {
        let slot = Self::slot(namespace, key);
        if let Some(hit) = self.memory.read().get(&slot) {
            return Ok(Arc::clone(hit));
        }

        let store = self.store.as_ref().ok_or(CacheError::CacheMiss)?;
        let bytes = store.get(&slot)?;
        let cached: CachedTask = bincode::deserialize(&bytes)
            .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
        if cached.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: cached.format_version,
            });
        }

        let cached = Arc::new(cached);
        self.memory.write().insert(slot, Arc::clone(&cached));
        Ok(cached)
    }

    pub fn try_store(&self, namespace: &str, key: &CacheKey, output: TaskOutput) -> CacheResult<()> {
        let slot = Self::slot(namespace, key);
        let cached = CachedTask::new(output);
        if let Some(store) = &self.store {
            let bytes = bincode::serialize(&cached)
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            store.put(&slot, &bytes)?;
        }
        self.memory.write().insert(slot, Arc::new(cached));
        Ok(())
    }

    /// Non-fatal lookup. Misses are silent, other failures are logged.
    pub fn load(&self, namespace: &str, key: &CacheKey) -> Option<Arc<CachedTask>> {
        match self.try_load(namespace, key) {
            Ok(hit) => Some(hit),
            Err(CacheError::CacheMiss) => None,
            Err(error) => {
                tracing::warn!(%namespace, %error, "cache read failed");
                None
            }
        }
    }

    /// Non-fatal write.
    pub fn store(&self, namespace: &str, key: &CacheKey, output: TaskOutput) {
        if let Err(error) = self.try_store(namespace, key, output) {
            tracing::warn!(%namespace, %error, "cache write failed");
        }
    }

    /// Drop every entry from both layers.
    pub fn clear(&self) -> CacheResult<()> {
        self.memory.write().clear();
        if let Some(store) = &self.store {
            store.clear()?;
        }
        Ok(())
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }
}
