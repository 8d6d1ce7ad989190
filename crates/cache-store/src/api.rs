use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, warn};

use crate::errors::{CacheErrKind, CacheError};
use crate::fs::{layout, reader, sweep, writer, StoredEntry};
use crate::policy::StoragePolicy;

pub type StorageResult<T> = Result<T, CacheError>;

/// Summary of one stored entry, as reported by listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub bytes: usize,
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    /// Atomic: readers observe either the previous value or the complete new one.
    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;
    async fn exists(&self, key: &str) -> StorageResult<bool>;
    async fn remove(&self, key: &str) -> StorageResult<bool>;
    async fn entries(&self) -> StorageResult<Vec<EntryMeta>>;
    async fn prune_older_than(&self, max_age: ChronoDuration) -> StorageResult<usize>;
}

pub(crate) fn check_put(policy: &StoragePolicy, key: &str, value: &[u8]) -> StorageResult<()> {
    if policy.read_only {
        return Err(CacheErrKind::ReadOnly.into());
    }
    if key.trim().is_empty() {
        return Err(CacheErrKind::EmptyKey.into());
    }
    if value.len() > policy.max_entry_bytes {
        return Err(CacheErrKind::Oversize {
            bytes: value.len(),
            limit: policy.max_entry_bytes,
        }
        .into());
    }
    Ok(())
}

/// Filesystem-backed storage. Construction never touches the disk.
#[derive(Debug, Clone)]
pub struct FsCacheStorage {
    policy: StoragePolicy,
}

impl FsCacheStorage {
    pub fn new(policy: StoragePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &StoragePolicy {
        &self.policy
    }

    pub fn root(&self) -> PathBuf {
        self.policy.namespace_root()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        layout::entry_path(&self.root(), key)
    }

    async fn read(&self, key: &str) -> StorageResult<Option<StoredEntry>> {
        let path = self.path_for(key);
        let entry = reader::read_entry(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::InvalidData {
                CacheError::new(CacheErrKind::Corrupt(format!(
                    "{}: {err}",
                    path.display()
                )))
            } else {
                CacheError::io(err)
            }
        })?;
        match entry {
            // Digest collisions are practically impossible, but a mismatched key is still a miss.
            Some(entry) if entry.key != key => {
                warn!(path = %path.display(), "cache entry key mismatch");
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

#[async_trait]
impl CacheStorage for FsCacheStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.read(key).await? {
            Some(entry) => entry.open().map(Some),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        check_put(&self.policy, key, value)?;
        let path = self.path_for(key);
        let envelope = StoredEntry::seal(key, value);
        let payload = serde_json::to_vec(&envelope)
            .map_err(|err| CacheError::new(CacheErrKind::Corrupt(err.to_string())))?;
        writer::write_atomic(&path, &payload).await?;
        debug!(path = %path.display(), bytes = value.len(), "cache entry stored");
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.read(key).await?.is_some())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        if self.policy.read_only {
            return Err(CacheErrKind::ReadOnly.into());
        }
        Ok(writer::remove_entry(&self.path_for(key)).await?)
    }

    async fn entries(&self) -> StorageResult<Vec<EntryMeta>> {
        let mut metas = Vec::new();
        for path in sweep::list_entry_files(&self.root()).await? {
            match reader::read_entry(&path).await {
                Ok(Some(entry)) => {
                    let bytes = entry.open().map(|data| data.len()).unwrap_or_default();
                    metas.push(EntryMeta {
                        key: entry.key,
                        stored_at: entry.stored_at,
                        bytes,
                    });
                }
                Ok(None) => {}
                Err(err) => warn!(%err, path = %path.display(), "skipping unreadable cache entry"),
            }
        }
        Ok(metas)
    }

    async fn prune_older_than(&self, max_age: ChronoDuration) -> StorageResult<usize> {
        if self.policy.read_only {
            return Err(CacheErrKind::ReadOnly.into());
        }
        if max_age <= ChronoDuration::zero() {
            return Ok(0);
        }
        let cutoff = Utc::now() - max_age;
        let temps = sweep::remove_stale_temp_files(&self.root(), SystemTime::from(cutoff)).await?;
        if temps > 0 {
            debug!(temps, "removed abandoned temp files");
        }
        let mut removed = 0usize;
        for path in sweep::list_entry_files(&self.root()).await? {
            let stale = match reader::read_entry(&path).await {
                Ok(Some(entry)) => entry.stored_at < cutoff,
                Ok(None) => false,
                // Unreadable entries can never be served; clear them with the stale ones.
                Err(_) => true,
            };
            if stale && writer::remove_entry(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
