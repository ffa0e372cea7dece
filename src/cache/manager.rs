use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::FileCacheConfig;
use super::stats::{CacheMetrics, CleanupStats};
use super::traits::CacheStore;
use crate::utils::Result;

/// Size budget and cleanup fractions for the LRU policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    pub max_size: u64,
    /// Cleanup runs once `size / max_size` exceeds this fraction
    pub cleanup_threshold: f64,
    /// A cleanup pass frees space until `size <= max_size * target`
    pub target_size_after_cleanup: f64,
}

impl EvictionPolicy {
    pub fn from_config(config: &FileCacheConfig) -> Self {
        Self {
            max_size: config.max_size(),
            cleanup_threshold: config.cleanup_threshold,
            target_size_after_cleanup: config.target_size_after_cleanup,
        }
    }

    pub fn needs_cleanup(&self, current_size: u64) -> bool {
        self.max_size > 0 && current_size as f64 / self.max_size as f64 > self.cleanup_threshold
    }

    pub fn target_size(&self) -> u64 {
        (self.max_size as f64 * self.target_size_after_cleanup) as u64
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::from_config(&FileCacheConfig::default())
    }
}

/// Keeps the store under its size budget and owns the cache metrics.
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    policy: EvictionPolicy,
    metrics: Mutex<CacheMetrics>,
    cleanup_lock: tokio::sync::Mutex<()>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, policy: EvictionPolicy) -> Self {
        Self {
            store,
            policy,
            metrics: Mutex::new(CacheMetrics::default()),
            cleanup_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Run an LRU cleanup pass if the cache is above its threshold.
    ///
    /// Entries are removed oldest access first until enough space is freed.
    /// The most recently accessed entry is never evicted, so a blob that was
    /// just stored survives the pass it triggered. Individual removal
    /// failures are logged and skipped.
    pub async fn manage_cache(&self) -> Result<CleanupStats> {
        let _guard = self.cleanup_lock.lock().await;
        let start = Instant::now();

        let current_size = self.store.total_size();
        if !self.policy.needs_cleanup(current_size) {
            self.set_total_bytes(current_size);
            return Ok(CleanupStats::default());
        }

        let bytes_to_free = current_size.saturating_sub(self.policy.target_size());
        info!(
            "Starting LRU cleanup: {} KB stored, budget {} KB, freeing {} KB",
            current_size / 1024,
            self.policy.max_size / 1024,
            bytes_to_free / 1024
        );

        let mut entries = self.store.entries_by_last_access().await?;
        entries.pop(); // most recently accessed entry stays

        let mut stats = CleanupStats::default();
        for entry in entries {
            if stats.bytes_freed >= bytes_to_free {
                break;
            }

            match self.store.remove(&entry.key).await {
                Ok(()) => {
                    debug!("Evicted {} ({} bytes)", entry.key, entry.size_bytes);
                    stats.bytes_freed += entry.size_bytes;
                    stats.entries_removed += 1;
                }
                Err(e) => {
                    warn!("Failed to evict {}: {}", entry.key, e);
                    stats.failed_removals += 1;
                }
            }
        }

        stats.duration = start.elapsed();
        {
            let mut metrics = self.lock_metrics();
            metrics.eviction_count += stats.entries_removed;
            metrics.total_bytes_stored = self.store.total_size();
        }

        info!(
            "Cache cleanup completed - removed {} entries, freed {} KB, {} failures, took {:?}",
            stats.entries_removed,
            stats.bytes_freed / 1024,
            stats.failed_removals,
            stats.duration
        );

        Ok(stats)
    }

    pub fn record_cache_hit(&self) {
        self.lock_metrics().hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock_metrics().misses += 1;
    }

    pub fn record_bytes_downloaded(&self, bytes: u64) {
        self.lock_metrics().network_bytes_downloaded += bytes;
    }

    /// Fold a load time into the running mean.
    ///
    /// Uses `n = hits + misses` as the sample count, so record the load time
    /// before the hit or miss it belongs to. Early samples weigh as much as
    /// late ones; this is a plain incremental mean, not a window.
    pub fn record_load_time(&self, sample: Duration) {
        let mut metrics = self.lock_metrics();
        let n = (metrics.hits + metrics.misses) as f64;
        let average = (metrics.average_load_time.as_secs_f64() * n + sample.as_secs_f64()) / (n + 1.0);
        metrics.average_load_time = Duration::from_secs_f64(average);
    }

    pub fn current_metrics(&self) -> CacheMetrics {
        let mut metrics = self.lock_metrics().clone();
        metrics.total_bytes_stored = self.store.total_size();
        metrics
    }

    fn set_total_bytes(&self, bytes: u64) {
        self.lock_metrics().total_bytes_stored = bytes;
    }

    fn lock_metrics(&self) -> std::sync::MutexGuard<'_, CacheMetrics> {
        // A panic while holding the lock cannot leave the counters half-written
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
