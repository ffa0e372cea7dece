// Adaptive video caching and single-active-playback coordination for
// scrolling video feeds.

pub mod cache;
pub mod config;
pub mod constants;
pub mod models;
pub mod player;
pub mod utils;
pub mod workers;

pub use cache::{CacheKey, CacheManager, CacheService, CacheStore};
pub use models::{ContentDescriptor, ContentId, NetworkCondition, QualityLevel};
pub use player::{PlayableHandle, PlaybackCoordinator};
pub use utils::{FeedError, Result};
pub use workers::NetworkMonitor;
