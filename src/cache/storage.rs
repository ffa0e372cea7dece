use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs as tokio_fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::config::FileCacheConfig;
use super::metadata::{CacheEntry, CacheKey, MetadataIndex};
use super::traits::CacheStore;
use crate::constants::METADATA_FILE_NAME;
use crate::utils::{FeedError, Result};

const TEMP_SUFFIX: &str = ".tmp";

/// Commands processed by the storage actor, strictly one at a time
#[derive(Debug)]
pub enum StorageCommand {
    Store {
        key: CacheKey,
        data: Bytes,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Retrieve {
        key: CacheKey,
        respond_to: oneshot::Sender<Result<Option<Bytes>>>,
    },
    Contains {
        key: CacheKey,
        respond_to: oneshot::Sender<bool>,
    },
    Remove {
        key: CacheKey,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Clear {
        respond_to: oneshot::Sender<Result<()>>,
    },
    ListEntries {
        respond_to: oneshot::Sender<Vec<CacheEntry>>,
    },
    Shutdown,
}

/// Disk-backed blob store. Owns the cache directory and its metadata index
/// exclusively; all access goes through [`CacheStorageHandle`].
pub struct CacheStorage {
    cache_dir: PathBuf,
    metadata_file: PathBuf,
    index: MetadataIndex,
    total_size: Arc<AtomicU64>,
    last_access: DateTime<Utc>,
    command_receiver: mpsc::UnboundedReceiver<StorageCommand>,
}

impl CacheStorage {
    /// Open the cache described by `config`
    pub async fn new(config: &FileCacheConfig) -> Result<(CacheStorageHandle, Self)> {
        Self::open(config.cache_directory()?).await
    }

    /// Open (or create) a cache rooted at `cache_dir`, reconciling the
    /// directory contents with the metadata index.
    pub async fn open(cache_dir: PathBuf) -> Result<(CacheStorageHandle, Self)> {
        let metadata_file = cache_dir.join(METADATA_FILE_NAME);

        tokio_fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| FeedError::storage(format!("create {:?}", cache_dir), e))?;

        let index = match Self::load_metadata(&metadata_file).await {
            Ok(Some(index)) => index,
            Ok(None) => MetadataIndex::default(),
            Err(e) => {
                warn!("Failed to load cache metadata: {}, rebuilding from empty index", e);
                MetadataIndex::default()
            }
        };

        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let total_size = Arc::new(AtomicU64::new(0));

        let mut storage = Self {
            cache_dir: cache_dir.clone(),
            metadata_file,
            index,
            total_size: total_size.clone(),
            last_access: DateTime::<Utc>::MIN_UTC,
            command_receiver,
        };

        storage.reconcile().await?;
        storage.publish_size();

        info!(
            "Cache storage initialized at {:?} with {} entries ({} KB)",
            storage.cache_dir,
            storage.index.len(),
            storage.index.total_size() / 1024
        );

        let handle = CacheStorageHandle {
            command_sender,
            total_size,
            cache_dir,
        };

        Ok((handle, storage))
    }

    /// Open the cache and run its actor on the current tokio runtime
    pub async fn spawn(cache_dir: PathBuf) -> Result<CacheStorageHandle> {
        let (handle, storage) = Self::open(cache_dir).await?;
        tokio::spawn(storage.run());
        Ok(handle)
    }

    /// Run the storage command loop until shutdown or every handle is dropped
    pub async fn run(mut self) {
        debug!("CacheStorage: entering command loop");

        while let Some(command) = self.command_receiver.recv().await {
            match command {
                StorageCommand::Store {
                    key,
                    data,
                    respond_to,
                } => {
                    let result = self.store(key, data).await;
                    let _ = respond_to.send(result);
                }
                StorageCommand::Retrieve { key, respond_to } => {
                    let result = self.retrieve(&key).await;
                    let _ = respond_to.send(result);
                }
                StorageCommand::Contains { key, respond_to } => {
                    let _ = respond_to.send(self.index.contains(&key));
                }
                StorageCommand::Remove { key, respond_to } => {
                    let result = self.remove(&key).await;
                    let _ = respond_to.send(result);
                }
                StorageCommand::Clear { respond_to } => {
                    let result = self.clear().await;
                    let _ = respond_to.send(result);
                }
                StorageCommand::ListEntries { respond_to } => {
                    let _ = respond_to.send(self.index.entries_by_last_access());
                }
                StorageCommand::Shutdown => {
                    info!("CacheStorage: shutting down");
                    break;
                }
            }
            self.publish_size();
        }
    }

    async fn load_metadata(metadata_file: &Path) -> Result<Option<MetadataIndex>> {
        let contents = match tokio_fs::read_to_string(metadata_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FeedError::storage("read metadata index", e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| FeedError::storage("parse metadata index", e))
    }

    /// Write the index to a temp file and rename it over the old one
    async fn save_metadata(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.index)
            .map_err(|e| FeedError::storage("serialize metadata index", e))?;

        let temp_file = self.temp_path(&self.metadata_file);
        tokio_fs::write(&temp_file, contents)
            .await
            .map_err(|e| FeedError::storage("write metadata index", e))?;
        tokio_fs::rename(&temp_file, &self.metadata_file)
            .await
            .map_err(|e| FeedError::storage("replace metadata index", e))
    }

    /// Drop index entries whose blob is missing or mis-sized and delete blobs
    /// the index does not know about.
    async fn reconcile(&mut self) -> Result<()> {
        let mut invalid = Vec::new();

        for entry in self.index.entries() {
            let path = self.blob_path(&entry.key);
            match tokio_fs::metadata(&path).await {
                Ok(meta) if meta.len() == entry.size_bytes => {}
                Ok(meta) => {
                    warn!(
                        "Cache blob size mismatch for {}: expected {}, actual {}",
                        entry.key,
                        entry.size_bytes,
                        meta.len()
                    );
                    invalid.push(entry.key.clone());
                }
                Err(_) => {
                    warn!("Cache blob missing for {}: {:?}", entry.key, path);
                    invalid.push(entry.key.clone());
                }
            }
        }

        let mut changed = !invalid.is_empty();
        for key in invalid {
            let _ = tokio_fs::remove_file(self.blob_path(&key)).await;
            self.index.remove(&key);
        }

        let known: HashSet<String> = self.index.entries().map(|e| e.key.to_filename()).collect();
        let mut dir = tokio_fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| FeedError::storage("scan cache directory", e))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| FeedError::storage("scan cache directory", e))?
        {
            let name = item.file_name().to_string_lossy().to_string();
            if name == METADATA_FILE_NAME || known.contains(&name) {
                continue;
            }
            if item.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                debug!("Removing orphaned cache file {:?}", item.path());
                if let Err(e) = tokio_fs::remove_file(item.path()).await {
                    warn!("Failed to remove orphaned cache file {:?}: {}", item.path(), e);
                }
                changed = true;
            }
        }

        if changed {
            self.save_metadata().await?;
        }

        Ok(())
    }

    async fn store(&mut self, key: CacheKey, data: Bytes) -> Result<()> {
        if !key.quality.is_resolved() {
            return Err(FeedError::Validation(format!(
                "refusing to store {} with unresolved quality",
                key
            )));
        }

        let path = self.blob_path(&key);
        let temp_path = self.temp_path(&path);

        tokio_fs::write(&temp_path, &data)
            .await
            .map_err(|e| FeedError::storage(format!("write blob {}", key), e))?;
        if let Err(e) = tokio_fs::rename(&temp_path, &path).await {
            let _ = tokio_fs::remove_file(&temp_path).await;
            return Err(FeedError::storage(format!("commit blob {}", key), e));
        }

        let accessed_at = self.next_access_time();
        self.index
            .insert(CacheEntry::new(key.clone(), data.len() as u64, accessed_at));

        if let Err(e) = self.save_metadata().await {
            // Blob and index must stay in step: undo the blob
            error!("Failed to persist metadata for {}: {}", key, e);
            self.index.remove(&key);
            let _ = tokio_fs::remove_file(&path).await;
            return Err(e);
        }

        debug!("Stored {} ({} bytes)", key, data.len());
        Ok(())
    }

    async fn retrieve(&mut self, key: &CacheKey) -> Result<Option<Bytes>> {
        if !self.index.contains(key) {
            return Ok(None);
        }

        let path = self.blob_path(key);
        let data = match tokio_fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Cache entry exists in metadata but file is missing: {}", key);
                self.index.remove(key);
                self.save_metadata().await?;
                return Ok(None);
            }
            Err(e) => return Err(FeedError::storage(format!("read blob {}", key), e)),
        };

        let accessed_at = self.next_access_time();
        self.index.touch(key, accessed_at);
        if let Err(e) = self.save_metadata().await {
            // Access time is advisory; the blob is still served
            warn!("Failed to persist access time for {}: {}", key, e);
        }

        Ok(Some(Bytes::from(data)))
    }

    async fn remove(&mut self, key: &CacheKey) -> Result<()> {
        let path = self.blob_path(key);
        match tokio_fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(FeedError::storage(format!("remove blob {}", key), e)),
        }

        if self.index.remove(key).is_some() {
            self.save_metadata().await?;
            debug!("Removed cache entry {}", key);
        }
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        info!("🗑️ Clearing {} cache entries", self.index.len());

        let keys: Vec<CacheKey> = self.index.entries().map(|e| e.key.clone()).collect();
        for key in keys {
            match tokio_fs::remove_file(self.blob_path(&key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(FeedError::storage(format!("remove blob {}", key), e)),
            }
            self.index.remove(&key);
        }

        self.save_metadata().await
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.to_filename())
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }

    /// Access timestamps are strictly increasing so LRU order never ties
    fn next_access_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.last_access = if now > self.last_access {
            now
        } else {
            self.last_access + chrono::Duration::microseconds(1)
        };
        self.last_access
    }

    fn publish_size(&self) {
        self.total_size
            .store(self.index.total_size(), Ordering::Release);
    }
}

/// Cloneable handle to a running [`CacheStorage`] actor
#[derive(Debug, Clone)]
pub struct CacheStorageHandle {
    command_sender: mpsc::UnboundedSender<StorageCommand>,
    total_size: Arc<AtomicU64>,
    cache_dir: PathBuf,
}

impl CacheStorageHandle {
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Stop the storage actor. Pending commands ahead of this one still run.
    pub fn shutdown(&self) -> Result<()> {
        self.command_sender
            .send(StorageCommand::Shutdown)
            .map_err(|_| FeedError::Storage("Cache storage disconnected".to_string()))
    }

    async fn request<T>(
        &self,
        make_command: impl FnOnce(oneshot::Sender<T>) -> StorageCommand,
    ) -> Result<T> {
        let (sender, receiver) = oneshot::channel();
        self.command_sender.send(make_command(sender)).map_err(|_| {
            error!("Cache storage actor is gone");
            FeedError::Storage("Cache storage disconnected".to_string())
        })?;

        receiver
            .await
            .map_err(|_| FeedError::Storage("No response from cache storage".to_string()))
    }
}

#[async_trait]
impl CacheStore for CacheStorageHandle {
    async fn store(&self, key: &CacheKey, data: Bytes) -> Result<()> {
        let key = key.clone();
        self.request(|respond_to| StorageCommand::Store {
            key,
            data,
            respond_to,
        })
        .await?
    }

    async fn retrieve(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let key = key.clone();
        self.request(|respond_to| StorageCommand::Retrieve { key, respond_to })
            .await?
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        let key = key.clone();
        self.request(|respond_to| StorageCommand::Contains { key, respond_to })
            .await
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        let key = key.clone();
        self.request(|respond_to| StorageCommand::Remove { key, respond_to })
            .await?
    }

    async fn clear(&self) -> Result<()> {
        self.request(|respond_to| StorageCommand::Clear { respond_to })
            .await?
    }

    async fn entries_by_last_access(&self) -> Result<Vec<CacheEntry>> {
        self.request(|respond_to| StorageCommand::ListEntries { respond_to })
            .await
    }

    fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Acquire)
    }
}
