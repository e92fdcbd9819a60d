//! TTL cache seam used by the notifier pipeline for cooldown bookkeeping.
//!
//! The in-memory [`MemoryCache`] is the reference implementation; backends
//! over external stores (Redis-class services) implement the same trait and
//! are opaque to the rest of the system.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key is absent or its entry has expired.
    #[error("cache key not found")]
    NotFound,

    /// A backend-specific failure (I/O, connection, encoding).
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

/// Byte-oriented cache with per-entry TTL.
#[async_trait]
pub trait TtlCache: Send + Sync {
    /// Store `value` under `key` for `ttl`. A zero TTL expires immediately.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Fetch the value under `key`; `CacheError::NotFound` when absent or
    /// expired.
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    /// Whether a live entry exists under `key`.
    async fn exist(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove the entry under `key`; removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// The delimiter this implementation accepts inside compound keys.
    fn separator(&self) -> &str;
}
