use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{CacheError, TtlCache};

const DEFAULT_SEPARATOR: &str = ":";
const DEFAULT_COMPACT_EVERY: u64 = 1024;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process TTL cache.
///
/// Reads take the shared lock; writes the exclusive one. Expired entries are
/// deleted lazily on `get`, and every `compact_every` writes the whole map is
/// rebuilt under the write lock with expired entries dropped, so keys that
/// are never read again do not accumulate.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicU64,
    compact_every: u64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_compaction(DEFAULT_COMPACT_EVERY)
    }

    pub fn with_compaction(compact_every: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
            compact_every: compact_every.max(1),
        }
    }

    /// Number of entries currently stored, including not-yet-compacted
    /// expired ones.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn maybe_compact(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.compact_every != 0 {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.write();
        let live: HashMap<String, Entry> = entries
            .drain()
            .filter(|(_, e)| !e.is_expired(now))
            .collect();
        *entries = live;
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlCache for MemoryCache {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        self.maybe_compact();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(entry.value.clone()),
                Some(_) => {}
                None => return Err(CacheError::NotFound),
            }
        }
        // Expired: upgrade to the write lock and remove lazily.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
            } else {
                return Ok(entry.value.clone());
            }
        }
        Err(CacheError::NotFound)
    }

    async fn exist(&self, key: &str) -> Result<bool, CacheError> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(CacheError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn separator(&self) -> &str {
        DEFAULT_SEPARATOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"value", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), b"value");
        assert!(cache.exist("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let cache = MemoryCache::new();
        let err = cache.get("absent").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!cache.exist("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", Duration::ZERO).await.unwrap();
        assert!(cache.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_expired_entry_removed_lazily() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.len(), 1);
        let _ = cache.get("k").await;
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert!(!cache.exist("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_value_and_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", b"old", Duration::ZERO).await.unwrap();
        cache
            .set("k", b"new", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_compaction_drops_expired_entries() {
        let cache = MemoryCache::with_compaction(4);
        for i in 0..3 {
            cache
                .set(&format!("dead-{i}"), b"x", Duration::ZERO)
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);
        // Fourth write triggers the rebuild.
        cache
            .set("live", b"x", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.exist("live").await.unwrap());
    }

    #[test]
    fn test_separator_is_stable() {
        let cache = MemoryCache::new();
        assert_eq!(cache.separator(), ":");
    }
}
