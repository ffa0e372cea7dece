//! # Cache Service
//!
//! Entry point the feed talks to. Picks a quality tier for the current
//! network, runs speculative prefetches and serves playable handles on
//! demand. Downloads are validated before they reach the store, and
//! concurrent loads of one key share a single future.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::downloader::Downloader;
use super::manager::CacheManager;
use super::metadata::CacheKey;
use super::stats::{CacheMetrics, PrefetchStats};
use super::traits::CacheStore;
use crate::models::{ContentDescriptor, NetworkCondition, QualityLevel};
use crate::player::adaptive_quality;
use crate::player::playable::PlayableHandle;
use crate::utils::{FeedError, Result};
use crate::workers::NetworkMonitor;

type LoadFuture = BoxFuture<'static, Result<PlayableHandle>>;

/// How a single prefetch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchOutcome {
    Completed,
    AlreadyCached,
    Cancelled,
    Failed(FeedError),
}

/// Join handle for one spawned prefetch
#[derive(Debug)]
pub struct PrefetchHandle {
    key: CacheKey,
    task: JoinHandle<PrefetchOutcome>,
}

impl PrefetchHandle {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub async fn outcome(self) -> PrefetchOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => PrefetchOutcome::Cancelled,
            Err(e) => PrefetchOutcome::Failed(FeedError::State(format!(
                "prefetch task for {} panicked: {}",
                self.key, e
            ))),
        }
    }
}

struct PrefetchTask {
    generation: u64,
    token: CancellationToken,
}

struct InFlightLoad {
    generation: u64,
    future: WeakShared<LoadFuture>,
}

/// Lives inside a load future and unregisters it from `in_flight` when the
/// future completes or is dropped unfinished.
struct InFlightGuard {
    service: Arc<CacheService>,
    storage_key: String,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.service.lock_in_flight();
        if in_flight
            .get(&self.storage_key)
            .is_some_and(|load| load.generation == self.generation)
        {
            in_flight.remove(&self.storage_key);
        }
    }
}

pub struct CacheService {
    store: Arc<dyn CacheStore>,
    manager: Arc<CacheManager>,
    monitor: Arc<NetworkMonitor>,
    downloader: Downloader,
    prefetch_limit: usize,
    in_flight: Mutex<HashMap<String, InFlightLoad>>,
    prefetches: Mutex<HashMap<String, PrefetchTask>>,
    next_generation: AtomicU64,
    prefetch_stats: PrefetchStats,
}

impl CacheService {
    /// Build the service and subscribe it to network changes. Prefetches are
    /// cancelled as soon as the monitor reports a poor or missing link.
    pub fn new(
        store: Arc<dyn CacheStore>,
        manager: Arc<CacheManager>,
        monitor: Arc<NetworkMonitor>,
        downloader: Downloader,
        prefetch_limit: usize,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            store,
            manager,
            monitor,
            downloader,
            prefetch_limit,
            in_flight: Mutex::new(HashMap::new()),
            prefetches: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            prefetch_stats: PrefetchStats::new(),
        });

        let weak = Arc::downgrade(&service);
        service.monitor.subscribe(move |condition| {
            if condition.allows_prefetch() {
                return;
            }
            if let Some(service) = weak.upgrade() {
                let cancelled = service.cancel_all_prefetches();
                if cancelled > 0 {
                    info!("Network degraded to {}, cancelled {} prefetches", condition, cancelled);
                }
            }
        });

        service
    }

    pub fn determine_optimal_quality(&self, condition: NetworkCondition) -> QualityLevel {
        adaptive_quality::determine_optimal_quality(condition)
    }

    pub fn current_quality(&self) -> QualityLevel {
        self.determine_optimal_quality(self.monitor.current_condition())
    }

    /// Start best-effort downloads for the first few descriptors.
    ///
    /// Nothing is started on a poor or missing link. Keys already being
    /// prefetched are skipped; keys already cached finish as
    /// [`PrefetchOutcome::AlreadyCached`] without touching the network.
    pub fn prefetch(self: &Arc<Self>, descriptors: &[ContentDescriptor]) -> Vec<PrefetchHandle> {
        let condition = self.monitor.current_condition();
        if !condition.allows_prefetch() {
            debug!("Skipping prefetch of {} items on {}", descriptors.len(), condition);
            for _ in descriptors {
                self.prefetch_stats.increment_skipped();
            }
            return Vec::new();
        }

        let quality = self.determine_optimal_quality(condition);
        let mut handles = Vec::new();

        for descriptor in descriptors.iter().take(self.prefetch_limit) {
            let key = CacheKey::new(descriptor.id.clone(), quality);
            let storage_key = key.storage_key();
            let token = CancellationToken::new();

            let generation = {
                let mut prefetches = self.lock_prefetches();
                if prefetches.contains_key(&storage_key) {
                    debug!("Prefetch for {} already running", key);
                    self.prefetch_stats.increment_skipped();
                    continue;
                }
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                prefetches.insert(
                    storage_key.clone(),
                    PrefetchTask {
                        generation,
                        token: token.clone(),
                    },
                );
                generation
            };

            self.prefetch_stats.increment_started();
            let service = Arc::clone(self);
            let url = descriptor.url.clone();
            let task_key = key.clone();

            let task = tokio::spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => PrefetchOutcome::Cancelled,
                    result = service.prefetch_one(&url, &task_key) => match result {
                        Ok(outcome) => outcome,
                        Err(FeedError::Cancelled) => PrefetchOutcome::Cancelled,
                        Err(e) => PrefetchOutcome::Failed(e),
                    },
                };
                service.finish_prefetch(&task_key, generation, &outcome);
                outcome
            });

            handles.push(PrefetchHandle { key, task });
        }

        handles
    }

    /// Serve a playable handle for `key`, downloading and caching it on a miss.
    ///
    /// An `Auto` key is resolved against the current network first. Concurrent
    /// calls for the same key share one load.
    pub async fn fetch_playable(self: &Arc<Self>, url: &str, key: &CacheKey) -> Result<PlayableHandle> {
        let key = if key.quality.is_resolved() {
            key.clone()
        } else {
            key.with_quality(self.current_quality())
        };
        self.shared_load(url, key).await
    }

    /// Cancel every running prefetch. Returns how many were signalled.
    pub fn cancel_all_prefetches(&self) -> usize {
        let drained: Vec<PrefetchTask> = self.lock_prefetches().drain().map(|(_, task)| task).collect();
        for task in &drained {
            task.token.cancel();
        }
        drained.len()
    }

    pub fn cancel_prefetch(&self, key: &CacheKey) -> bool {
        match self.lock_prefetches().remove(&key.storage_key()) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_prefetches(&self) -> usize {
        self.lock_prefetches().len()
    }

    pub async fn remove_from_cache(&self, key: &CacheKey) -> Result<()> {
        self.cancel_prefetch(key);
        self.store.remove(key).await?;
        info!("Removed {} from cache", key);
        Ok(())
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.cancel_all_prefetches();
        self.store.clear().await?;
        info!("Cleared video cache");
        Ok(())
    }

    pub fn prefetch_stats(&self) -> &PrefetchStats {
        &self.prefetch_stats
    }

    pub fn current_metrics(&self) -> CacheMetrics {
        self.manager.current_metrics()
    }

    /// Log cache and prefetch reports every `period` until the task is aborted
    pub fn start_stats_reporting(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                info!("{}", service.current_metrics().format_report());
                info!(
                    "{}",
                    service
                        .prefetch_stats
                        .format_report(service.active_prefetches())
                );
            }
        })
    }

    async fn prefetch_one(self: &Arc<Self>, url: &str, key: &CacheKey) -> Result<PrefetchOutcome> {
        if self.store.contains(key).await? {
            debug!("Prefetch for {} already cached", key);
            return Ok(PrefetchOutcome::AlreadyCached);
        }
        self.shared_load(url, key.clone()).await?;
        Ok(PrefetchOutcome::Completed)
    }

    fn finish_prefetch(&self, key: &CacheKey, generation: u64, outcome: &PrefetchOutcome) {
        {
            let mut prefetches = self.lock_prefetches();
            let storage_key = key.storage_key();
            if prefetches
                .get(&storage_key)
                .is_some_and(|task| task.generation == generation)
            {
                prefetches.remove(&storage_key);
            }
        }

        match outcome {
            PrefetchOutcome::Completed => {
                debug!("Prefetched {}", key);
                self.prefetch_stats.increment_completed();
            }
            PrefetchOutcome::AlreadyCached => self.prefetch_stats.increment_skipped(),
            PrefetchOutcome::Cancelled => {
                debug!("Prefetch for {} cancelled", key);
                self.prefetch_stats.increment_cancelled();
            }
            PrefetchOutcome::Failed(e) => {
                warn!("Prefetch for {} failed: {}", key, e);
                self.prefetch_stats.increment_failed();
            }
        }
    }

    fn shared_load(self: &Arc<Self>, url: &str, key: CacheKey) -> Shared<LoadFuture> {
        let storage_key = key.storage_key();
        let mut in_flight = self.lock_in_flight();

        if let Some(existing) = in_flight
            .get(&storage_key)
            .and_then(|load| load.future.upgrade())
        {
            debug!("Joining in-flight load for {}", key);
            return existing;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let guard = InFlightGuard {
            service: Arc::clone(self),
            storage_key: storage_key.clone(),
            generation,
        };
        let service = Arc::clone(self);
        let url = url.to_string();
        let future: LoadFuture = async move {
            let _guard = guard;
            service.load(&url, &key).await
        }
        .boxed();

        let shared = future.shared();
        if let Some(future) = shared.downgrade() {
            in_flight.insert(storage_key, InFlightLoad { generation, future });
        }
        shared
    }

    async fn load(&self, url: &str, key: &CacheKey) -> Result<PlayableHandle> {
        let start = Instant::now();

        if let Some(data) = self.store.retrieve(key).await? {
            match PlayableHandle::from_bytes(data) {
                Ok(handle) => {
                    debug!("Cache hit for {}", key);
                    self.manager.record_load_time(start.elapsed());
                    self.manager.record_cache_hit();
                    return Ok(handle);
                }
                Err(e) => {
                    warn!("Cached blob for {} no longer validates ({}), refetching", key, e);
                    self.store.remove(key).await?;
                }
            }
        }

        debug!("Cache miss for {}", key);
        let result = self.download_and_store(url, key).await;
        if result.is_ok() {
            self.manager.record_load_time(start.elapsed());
        }
        self.manager.record_cache_miss();
        result
    }

    async fn download_and_store(&self, url: &str, key: &CacheKey) -> Result<PlayableHandle> {
        let data = self.downloader.download(url).await?;
        self.manager.record_bytes_downloaded(data.len() as u64);

        let handle = PlayableHandle::from_bytes(data)?;

        // Once the write is queued the cleanup pass must follow it, even if
        // the caller stops waiting.
        let store = Arc::clone(&self.store);
        let manager = Arc::clone(&self.manager);
        let persist_key = key.clone();
        let blob = handle.data().clone();
        let persist = tokio::spawn(async move {
            store.store(&persist_key, blob).await?;
            if let Err(e) = manager.manage_cache().await {
                warn!("Cache cleanup after storing {} failed: {}", persist_key, e);
            }
            Ok::<(), FeedError>(())
        });

        persist.await.map_err(|e| persist_join_error(key, e))??;
        Ok(handle)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlightLoad>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_prefetches(&self) -> MutexGuard<'_, HashMap<String, PrefetchTask>> {
        self.prefetches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist_join_error(key: &CacheKey, e: JoinError) -> FeedError {
    if e.is_cancelled() {
        FeedError::Cancelled
    } else {
        FeedError::State(format!("storing {} panicked: {}", key, e))
    }
}
