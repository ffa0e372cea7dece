use async_trait::async_trait;
use bytes::Bytes;

use super::metadata::{CacheEntry, CacheKey};
use crate::utils::Result;

/// Key/blob storage backing the video cache.
///
/// Implementations serialize mutations internally; callers may invoke any
/// method concurrently. Operations on the same key complete in submission
/// order.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Write a blob and record its metadata. Keys with an unresolved quality
    /// are rejected.
    async fn store(&self, key: &CacheKey, data: Bytes) -> Result<()>;

    /// Read a blob, refreshing its access time. A miss is `Ok(None)`.
    async fn retrieve(&self, key: &CacheKey) -> Result<Option<Bytes>>;

    /// Check for a blob without touching its access time
    async fn contains(&self, key: &CacheKey) -> Result<bool>;

    /// Remove a blob and its metadata. Removing a missing key is not an error.
    async fn remove(&self, key: &CacheKey) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// All entries, least recently accessed first
    async fn entries_by_last_access(&self) -> Result<Vec<CacheEntry>>;

    /// Current total size of stored blobs in bytes. Never blocks.
    fn total_size(&self) -> u64;
}
