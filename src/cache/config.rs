use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::utils::{FeedError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheConfig {
    /// Maximum cache size in megabytes
    pub max_size_mb: u64,

    /// Exact byte budget; takes precedence over `max_size_mb` when set
    pub max_size_bytes: Option<u64>,

    /// Fraction of the budget (0-1] above which a cleanup pass runs
    pub cleanup_threshold: f64,

    /// Fraction of the budget a cleanup pass tries to shrink the cache to
    pub target_size_after_cleanup: f64,

    /// Directory to store cached blobs and the metadata index
    pub cache_directory: Option<PathBuf>,

    /// Number of descriptors from a prefetch request that are actually fetched
    pub prefetch_limit: usize,

    /// Number of parallel download connections
    pub max_concurrent_downloads: usize,

    /// How long a download waits for an admission slot
    pub admission_timeout_secs: u64,

    /// Per-request download timeout in seconds
    pub download_timeout_secs: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_CACHE_SIZE_MB,
            max_size_bytes: None,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            target_size_after_cleanup: DEFAULT_TARGET_SIZE_AFTER_CLEANUP,
            cache_directory: None, // Will be set to platform-specific default
            prefetch_limit: DEFAULT_PREFETCH_LIMIT,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            admission_timeout_secs: DEFAULT_ADMISSION_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

impl FileCacheConfig {
    /// Get the cache directory path, using platform-specific defaults if not set
    pub fn cache_directory(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_directory {
            Ok(dir.clone())
        } else {
            Self::default_cache_directory()
        }
    }

    /// `~/.cache/vidfeed/videos` on Linux, `~/Library/Caches/vidfeed/videos` on macOS
    pub fn default_cache_directory() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| FeedError::Config("Failed to get cache directory".to_string()))?;
        Ok(cache_dir.join("vidfeed").join("videos"))
    }

    pub fn max_size(&self) -> u64 {
        self.max_size_bytes
            .unwrap_or(self.max_size_mb * 1024 * 1024)
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_size() == 0 {
            return Err(FeedError::Config(
                "cache max size must be greater than 0".to_string(),
            ));
        }

        if !(self.cleanup_threshold > 0.0 && self.cleanup_threshold <= 1.0) {
            return Err(FeedError::Config(
                "cleanup_threshold must be in (0, 1]".to_string(),
            ));
        }

        if !(self.target_size_after_cleanup > 0.0
            && self.target_size_after_cleanup < self.cleanup_threshold)
        {
            return Err(FeedError::Config(
                "target_size_after_cleanup must be in (0, cleanup_threshold)".to_string(),
            ));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(FeedError::Config(
                "max_concurrent_downloads must be greater than 0".to_string(),
            ));
        }

        if self.download_timeout_secs == 0 || self.admission_timeout_secs == 0 {
            return Err(FeedError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
