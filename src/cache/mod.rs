pub mod config;
pub mod downloader;
pub mod manager;
pub mod memory;
pub mod metadata;
pub mod service;
pub mod stats;
pub mod storage;
pub mod traits;

pub use config::FileCacheConfig;
pub use downloader::Downloader;
pub use manager::{CacheManager, EvictionPolicy};
pub use memory::MemoryCacheStore;
pub use metadata::{CacheEntry, CacheKey, MetadataIndex};
pub use service::{CacheService, PrefetchHandle, PrefetchOutcome};
pub use stats::{CacheMetrics, CleanupStats, PrefetchStats};
pub use storage::{CacheStorage, CacheStorageHandle};
pub use traits::CacheStore;
