//! In-memory [`CacheStore`] for tests and for wiring the service without a
//! filesystem. Shares the metadata index and LRU ordering of the disk store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::metadata::{CacheEntry, CacheKey, MetadataIndex};
use super::traits::CacheStore;
use crate::utils::{FeedError, Result};

#[derive(Default)]
struct MemoryState {
    index: MetadataIndex,
    blobs: HashMap<String, Bytes>,
    last_access: Option<DateTime<Utc>>,
    failing_removals: HashSet<String>,
}

impl MemoryState {
    fn next_access_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_access {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_access = Some(next);
        next
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    state: Mutex<MemoryState>,
    total_size: AtomicU64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `remove` of `key` fail with a storage error
    pub async fn fail_removals_for(&self, key: &CacheKey) {
        self.state
            .lock()
            .await
            .failing_removals
            .insert(key.storage_key());
    }

    /// Insert an entry with an explicit access time
    pub async fn insert_with_access_time(
        &self,
        key: &CacheKey,
        data: Bytes,
        accessed_at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state
            .index
            .insert(CacheEntry::new(key.clone(), data.len() as u64, accessed_at));
        state.blobs.insert(key.storage_key(), data);
        self.total_size
            .store(state.index.total_size(), Ordering::Release);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn store(&self, key: &CacheKey, data: Bytes) -> Result<()> {
        if !key.quality.is_resolved() {
            return Err(FeedError::Validation(format!(
                "refusing to store {} with unresolved quality",
                key
            )));
        }

        let mut state = self.state.lock().await;
        let accessed_at = state.next_access_time();
        state
            .index
            .insert(CacheEntry::new(key.clone(), data.len() as u64, accessed_at));
        state.blobs.insert(key.storage_key(), data);
        self.total_size
            .store(state.index.total_size(), Ordering::Release);
        Ok(())
    }

    async fn retrieve(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let mut state = self.state.lock().await;
        let Some(data) = state.blobs.get(&key.storage_key()).cloned() else {
            return Ok(None);
        };
        let accessed_at = state.next_access_time();
        state.index.touch(key, accessed_at);
        Ok(Some(data))
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.state.lock().await.index.contains(key))
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failing_removals.contains(&key.storage_key()) {
            return Err(FeedError::Storage(format!("remove blob {}: injected", key)));
        }
        state.blobs.remove(&key.storage_key());
        state.index.remove(key);
        self.total_size
            .store(state.index.total_size(), Ordering::Release);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.blobs.clear();
        state.index.clear();
        self.total_size.store(0, Ordering::Release);
        Ok(())
    }

    async fn entries_by_last_access(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.state.lock().await.index.entries_by_last_access())
    }

    fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Acquire)
    }
}
