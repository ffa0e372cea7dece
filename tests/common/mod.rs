#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use vidfeed::Result;
use vidfeed::cache::{
    CacheEntry, CacheKey, CacheManager, CacheService, CacheStore, Downloader, EvictionPolicy,
    MemoryCacheStore,
};
use vidfeed::models::NetworkCondition;
use vidfeed::player::PlayerCell;
use vidfeed::workers::NetworkMonitor;

/// Smallest MP4 the playable probe accepts: `ftyp`, `moov` and a payload box
pub fn sample_mp4(payload_len: usize) -> Vec<u8> {
    let mut data = Vec::new();
    push_box(&mut data, b"ftyp", b"isom\0\0\x02\0isomiso2");
    push_box(&mut data, b"moov", &[0u8; 24]);
    push_box(&mut data, b"mdat", &vec![0x5a; payload_len]);
    data
}

fn push_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
}

pub struct TestServices {
    pub service: Arc<CacheService>,
    pub manager: Arc<CacheManager>,
    pub monitor: Arc<NetworkMonitor>,
}

pub fn build_service(
    store: Arc<dyn CacheStore>,
    policy: EvictionPolicy,
    condition: NetworkCondition,
) -> TestServices {
    let manager = Arc::new(CacheManager::new(store.clone(), policy));
    let monitor = Arc::new(NetworkMonitor::with_condition(condition));
    let downloader = Downloader::with_client(reqwest::Client::new(), 3, Duration::from_secs(5));
    let service = CacheService::new(store, manager.clone(), monitor.clone(), downloader, 3);
    TestServices {
        service,
        manager,
        monitor,
    }
}

/// Memory store whose `store` parks until the test releases it
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryCacheStore,
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl CacheStore for GatedStore {
    async fn store(&self, key: &CacheKey, data: Bytes) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.store(key, data).await
    }

    async fn retrieve(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        self.inner.retrieve(key).await
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        self.inner.contains(key).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn entries_by_last_access(&self) -> Result<Vec<CacheEntry>> {
        self.inner.entries_by_last_access().await
    }

    fn total_size(&self) -> u64 {
        self.inner.total_size()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellEvent {
    Play(usize, Option<Duration>),
    Pause(usize),
    Cleanup(usize),
}

/// Feed cell that records every call into a log shared across cells
pub struct MockCell {
    index: usize,
    ready: Mutex<bool>,
    position: Mutex<Option<Duration>>,
    log: Arc<Mutex<Vec<CellEvent>>>,
}

impl MockCell {
    pub fn new(index: usize, log: Arc<Mutex<Vec<CellEvent>>>) -> Arc<Self> {
        Arc::new(Self {
            index,
            ready: Mutex::new(true),
            position: Mutex::new(None),
            log,
        })
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock().unwrap() = Some(position);
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }
}

impl PlayerCell for MockCell {
    fn index(&self) -> usize {
        self.index
    }

    fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }

    fn play(&self, resume_from: Option<Duration>) {
        self.log
            .lock()
            .unwrap()
            .push(CellEvent::Play(self.index, resume_from));
    }

    fn pause(&self) {
        self.log.lock().unwrap().push(CellEvent::Pause(self.index));
    }

    fn cleanup(&self) {
        self.log.lock().unwrap().push(CellEvent::Cleanup(self.index));
    }

    fn current_position(&self) -> Option<Duration> {
        *self.position.lock().unwrap()
    }
}
