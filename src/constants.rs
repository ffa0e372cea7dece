// Tuning constants for caching, prefetching and playback coordination.
// Config files override most of these; the defaults live here in one place.

use std::time::Duration;

// === Cache sizing ===
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 1024; // 1 GiB
pub const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.9;
pub const DEFAULT_TARGET_SIZE_AFTER_CLEANUP: f64 = 0.7;
pub const METADATA_FILE_NAME: &str = "metadata.json";

// === Prefetch / download admission ===
pub const DEFAULT_PREFETCH_LIMIT: usize = 3;
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
pub const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

// === Network tiers ===
// Static per-interface estimates. These are tier hints, not measured throughput.
pub const WIFI_ESTIMATED_SPEED_BPS: u64 = 20_000_000;
pub const CELLULAR_ESTIMATED_SPEED_BPS: u64 = 5_000_000;
pub const WIFI_HIGH_QUALITY_MIN_BPS: u64 = 10_000_000;
pub const CELLULAR_MEDIUM_QUALITY_MIN_BPS: u64 = 5_000_000;

// === Playback coordination ===
pub const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PROGRESS_WINDOW: usize = 10;
