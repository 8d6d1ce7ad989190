use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use crate::api::{check_put, CacheStorage, EntryMeta, StorageResult};
use crate::policy::StoragePolicy;

/// Process-local storage for tests and hosts without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    policy: StoragePolicy,
    entries: DashMap<String, (DateTime<Utc>, Vec<u8>)>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StoragePolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().1.clone()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        check_put(&self.policy, key, value)?;
        self.entries
            .insert(key.to_string(), (Utc::now(), value.to_vec()));
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.contains_key(key))
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn entries(&self) -> StorageResult<Vec<EntryMeta>> {
        let mut metas: Vec<EntryMeta> = self
            .entries
            .iter()
            .map(|entry| EntryMeta {
                key: entry.key().clone(),
                stored_at: entry.value().0,
                bytes: entry.value().1.len(),
            })
            .collect();
        metas.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metas)
    }

    async fn prune_older_than(&self, max_age: ChronoDuration) -> StorageResult<usize> {
        if max_age <= ChronoDuration::zero() {
            return Ok(0);
        }
        let cutoff = Utc::now() - max_age;
        let before = self.entries.len();
        self.entries.retain(|_, (stored_at, _)| *stored_at >= cutoff);
        Ok(before - self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CacheErrKind;

    #[tokio::test]
    async fn put_get_remove() {
        let store = MemoryCacheStorage::new();
        assert!(!store.exists("k").await.unwrap());
        store.put("k", b"v1").await.unwrap();
        store.put("k", b"v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.len(), 1);
        assert!(store.remove("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversize_values_are_rejected() {
        let policy = StoragePolicy {
            max_entry_bytes: 4,
            ..StoragePolicy::default()
        };
        let store = MemoryCacheStorage::with_policy(policy);
        let err = store.put("k", b"too large").await.unwrap_err();
        assert!(matches!(err.kind(), CacheErrKind::Oversize { limit: 4, .. }));
        assert!(store.is_empty());
    }
}
