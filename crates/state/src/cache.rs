//! Local per-user cache for cart and wishlist collections.
//!
//! The cache is a plain key-value store of JSON strings: key format
//! `{prefix}-{collection}-{user_id}`, value a serialized array. There is no
//! schema versioning; a structurally incompatible value fails to parse and
//! the owning store falls back to an empty collection. Access is private
//! per user id and single-threaded, so no cross-process locking exists.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use cropcart_core::UserId;

use crate::sync::acquire;

/// Errors from the local cache itself (not from value parsing).
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A synchronous key-value store of JSON strings.
///
/// The in-memory store state is always authoritative for rendering; the
/// cache is a per-user mirror consulted only at hydration time, so every
/// operation here may fail without affecting correctness.
pub trait LocalCache: Send + Sync {
    /// Read the value under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Delete the value under `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Compose a cache key: `{prefix}-{collection}-{user_id}`.
#[must_use]
pub fn cache_key(prefix: &str, collection: &str, user_id: &UserId) -> String {
    format!("{prefix}-{collection}-{user_id}")
}

// =============================================================================
// Filesystem cache
// =============================================================================

/// One file per key under a cache directory.
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    /// Open (and create if needed) a cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are prefix-collection-userid; user ids come from the backend,
        // so anything outside a conservative set is flattened.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

impl LocalCache for FsCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        Ok(std::fs::write(self.path_for(key), value)?)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// In-memory cache
// =============================================================================

/// HashMap-backed cache for tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(acquire(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        acquire(&self.entries).insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        acquire(&self.entries).remove(key);
        Ok(())
    }
}

// =============================================================================
// Collection helpers
// =============================================================================

/// Load a serialized collection, falling back to empty on a missing,
/// unreadable, or unparseable value. Parse failures are a warning, never an
/// error: the cache carries no schema version, so stale shapes are expected
/// after upgrades.
pub(crate) fn load_collection<T: DeserializeOwned>(cache: &dyn LocalCache, key: &str) -> Vec<T> {
    let raw = match cache.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read cached collection");
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(key, error = %e, "cached collection failed to parse; starting empty");
            Vec::new()
        }
    }
}

/// Persist a collection, logging (not propagating) failures: the in-memory
/// state already changed and remains authoritative.
pub(crate) fn store_collection<T: Serialize>(cache: &dyn LocalCache, key: &str, items: &[T]) {
    let raw = match serde_json::to_string(items) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to serialize collection for cache");
            return;
        }
    };

    if let Err(e) = cache.set(key, &raw) {
        tracing::warn!(key, error = %e, "failed to persist collection to cache");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(
            cache_key("cropcart", "cart", &UserId::new("buyer-1")),
            "cropcart-cart-buyer-1"
        );
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache.set("k", "[1,2,3]").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("[1,2,3]"));
        cache.remove("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        // Removing again is a no-op.
        cache.remove("k").unwrap();
    }

    #[test]
    fn test_load_collection_falls_back_on_garbage() {
        let cache = MemoryCache::new();
        cache.set("bad", "{not json").unwrap();
        let items: Vec<u32> = load_collection(&cache, "bad");
        assert!(items.is_empty());
    }

    #[test]
    fn test_load_collection_missing_key_is_empty() {
        let cache = MemoryCache::new();
        let items: Vec<u32> = load_collection(&cache, "absent");
        assert!(items.is_empty());
    }

    #[test]
    fn test_store_then_load_round_trip() {
        let cache = MemoryCache::new();
        store_collection(&cache, "nums", &[1u32, 2, 3]);
        let items: Vec<u32> = load_collection(&cache, "nums");
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn test_fs_cache_round_trip() {
        let dir = std::env::temp_dir().join(format!("cropcart-cache-test-{}", std::process::id()));
        let cache = FsCache::open(&dir).unwrap();
        cache.set("cropcart-cart-buyer-1", "[]").unwrap();
        assert_eq!(
            cache.get("cropcart-cart-buyer-1").unwrap().as_deref(),
            Some("[]")
        );
        cache.remove("cropcart-cart-buyer-1").unwrap();
        assert_eq!(cache.get("cropcart-cart-buyer-1").unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
