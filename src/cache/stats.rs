use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-lifetime cache counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Live cache size; the only counter that can go down
    pub total_bytes_stored: u64,
    pub eviction_count: u64,
    pub average_load_time: Duration,
    pub network_bytes_downloaded: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }

    pub fn format_report(&self) -> String {
        format!(
            "📊 Cache Stats | Hits: {} | Misses: {} | Hit rate: {:.1}% | Stored: {:.1} MB | Evictions: {} | Downloaded: {:.1} MB | Avg load: {:?}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.total_bytes_stored as f64 / (1024.0 * 1024.0),
            self.eviction_count,
            self.network_bytes_downloaded as f64 / (1024.0 * 1024.0),
            self.average_load_time
        )
    }
}

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub entries_removed: u64,
    pub bytes_freed: u64,
    pub failed_removals: u64,
    pub duration: Duration,
}

/// Counters for speculative downloads
#[derive(Debug, Clone)]
pub struct PrefetchStats {
    pub prefetches_started: Arc<AtomicU64>,
    pub prefetches_completed: Arc<AtomicU64>,
    /// Real failures only; cancellations are counted separately
    pub prefetches_failed: Arc<AtomicU64>,
    pub prefetches_cancelled: Arc<AtomicU64>,
    /// Already cached, already in flight, or rejected by network condition
    pub prefetches_skipped: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Default for PrefetchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefetchStats {
    pub fn new() -> Self {
        Self {
            prefetches_started: Arc::new(AtomicU64::new(0)),
            prefetches_completed: Arc::new(AtomicU64::new(0)),
            prefetches_failed: Arc::new(AtomicU64::new(0)),
            prefetches_cancelled: Arc::new(AtomicU64::new(0)),
            prefetches_skipped: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn increment_started(&self) {
        self.prefetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.prefetches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.prefetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cancelled(&self) {
        self.prefetches_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.prefetches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started(&self) -> u64 {
        self.prefetches_started.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.prefetches_completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.prefetches_failed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.prefetches_cancelled.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.prefetches_skipped.load(Ordering::Relaxed)
    }

    pub fn format_report(&self, in_flight: usize) -> String {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let hours = uptime_secs / 3600;
        let minutes = (uptime_secs % 3600) / 60;
        let seconds = uptime_secs % 60;

        format!(
            "📥 Prefetch Stats [{}h {}m {}s] | Started: {} | Completed: {} | Failed: {} | Cancelled: {} | Skipped: {} | In flight: {}",
            hours,
            minutes,
            seconds,
            self.started(),
            self.completed(),
            self.failed(),
            self.cancelled(),
            self.skipped(),
            in_flight
        )
    }
}
