use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use super::config::FileCacheConfig;
use crate::utils::{FeedError, Result};

/// HTTP blob fetcher with a fixed number of concurrent download slots
#[derive(Debug, Clone)]
pub struct Downloader {
    http_client: Client,
    download_semaphore: Arc<Semaphore>,
    max_concurrent_downloads: usize,
    admission_timeout: Duration,
}

impl Downloader {
    pub fn new(config: &FileCacheConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.download_timeout())
            .build()
            .map_err(|e| FeedError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(
            http_client,
            config.max_concurrent_downloads,
            config.admission_timeout(),
        ))
    }

    pub fn with_client(
        http_client: Client,
        max_concurrent_downloads: usize,
        admission_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            download_semaphore: Arc::new(Semaphore::new(max_concurrent_downloads)),
            max_concurrent_downloads,
            admission_timeout,
        }
    }

    /// Number of downloads currently holding a slot
    pub fn active_downloads(&self) -> usize {
        self.max_concurrent_downloads - self.download_semaphore.available_permits()
    }

    /// GET `url` and return the full body.
    ///
    /// Waits at most the admission timeout for a free slot. Any status
    /// outside 200-299 is a network error.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let url = Url::parse(url)?;

        let _permit = timeout(self.admission_timeout, self.download_semaphore.acquire())
            .await
            .map_err(|_| {
                FeedError::Timeout(format!(
                    "no download slot free within {:?} for {}",
                    self.admission_timeout, url
                ))
            })?
            .map_err(|_| FeedError::Network("download pool closed".to_string()))?;

        debug!("Downloading {}", url);
        let response = self.http_client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Download of {} failed with HTTP {}", url, status);
            return Err(FeedError::Network(format!("HTTP {} for {}", status, url)));
        }

        let mut body = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(Bytes::from(body))
    }
}
