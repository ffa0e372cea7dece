use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{ContentId, QualityLevel};

/// Everything except `[A-Za-z0-9._-]` is escaped, `%` included, so distinct
/// storage keys never share a file name.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'-').remove(b'.');

/// Identifies one stored blob: a piece of content at a resolved quality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub content_id: ContentId,
    pub quality: QualityLevel,
}

impl CacheKey {
    pub fn new(content_id: impl Into<ContentId>, quality: QualityLevel) -> Self {
        Self {
            content_id: content_id.into(),
            quality,
        }
    }

    /// Deterministic `"{content_id}_{quality}"` form used as the index key
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.content_id, self.quality)
    }

    /// Percent-encoded storage key, safe as a single path component
    pub fn to_filename(&self) -> String {
        utf8_percent_encode(&self.storage_key(), FILENAME_ENCODE_SET).to_string()
    }

    pub fn with_quality(&self, quality: QualityLevel) -> Self {
        Self {
            content_id: self.content_id.clone(),
            quality,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.content_id, self.quality)
    }
}

/// Persisted metadata for one cached blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    #[serde(flatten)]
    pub key: CacheKey,
    pub last_access_date: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub fn new(key: CacheKey, size_bytes: u64, accessed_at: DateTime<Utc>) -> Self {
        Self {
            key,
            last_access_date: accessed_at,
            size_bytes,
        }
    }
}

/// The authoritative catalog of cached blobs, serialized as a plain
/// `storage key -> entry` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, CacheEntry>",
    into = "BTreeMap<String, CacheEntry>"
)]
pub struct MetadataIndex {
    entries: BTreeMap<String, CacheEntry>,
    total_size: u64,
}

impl From<BTreeMap<String, CacheEntry>> for MetadataIndex {
    fn from(entries: BTreeMap<String, CacheEntry>) -> Self {
        let total_size = entries.values().map(|e| e.size_bytes).sum();
        Self {
            entries,
            total_size,
        }
    }
}

impl From<MetadataIndex> for BTreeMap<String, CacheEntry> {
    fn from(index: MetadataIndex) -> Self {
        index.entries
    }
}

impl MetadataIndex {
    /// Add or replace an entry, keeping the running size total in step
    pub fn insert(&mut self, entry: CacheEntry) {
        let storage_key = entry.key.storage_key();
        if let Some(old) = self.entries.get(&storage_key) {
            self.total_size = self.total_size.saturating_sub(old.size_bytes);
        }
        self.total_size += entry.size_bytes;
        self.entries.insert(storage_key, entry);
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(&key.storage_key())?;
        self.total_size = self.total_size.saturating_sub(removed.size_bytes);
        Some(removed)
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(&key.storage_key())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(&key.storage_key())
    }

    /// Refresh the access time of an entry. Returns false if it is not indexed.
    pub fn touch(&mut self, key: &CacheKey, accessed_at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(&key.storage_key()) {
            Some(entry) => {
                entry.last_access_date = accessed_at;
                true
            }
            None => false,
        }
    }

    /// Entries ordered oldest access first; equal timestamps fall back to key order
    pub fn entries_by_last_access(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.last_access_date
                .cmp(&b.last_access_date)
                .then_with(|| a.key.storage_key().cmp(&b.key.storage_key()))
        });
        entries
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
    }
}
