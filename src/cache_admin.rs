//! Operator-facing maintenance of the agent cache.
//!
//! Eviction is always caller-driven; nothing here runs on a timer.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use agent_core::CachedAgentEntry;
use soulpilot_cache_store::{CacheError, CacheStorage};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntrySummary {
    pub fingerprint: String,
    pub stored_at: DateTime<Utc>,
    pub bytes: usize,
    /// `None` when the blob is not a readable agent entry.
    pub instruction: Option<String>,
    pub start_url: Option<String>,
    pub steps: Option<usize>,
}

pub struct CacheAdmin<S> {
    storage: S,
}

impl<S: CacheStorage> CacheAdmin<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<EntrySummary>, CacheError> {
        let mut summaries = Vec::new();
        for meta in self.storage.entries().await? {
            let entry = self.show(&meta.key).await?;
            summaries.push(EntrySummary {
                instruction: entry.as_ref().map(|e| e.instruction.clone()),
                start_url: entry.as_ref().map(|e| e.start_url.clone()),
                steps: entry.as_ref().map(|e| e.steps.len()),
                fingerprint: meta.key,
                stored_at: meta.stored_at,
                bytes: meta.bytes,
            });
        }
        summaries.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        Ok(summaries)
    }

    pub async fn show(&self, fingerprint: &str) -> Result<Option<CachedAgentEntry>, CacheError> {
        let Some(bytes) = self.storage.get(fingerprint).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(%fingerprint, error = %err, "cache blob is not an agent entry");
                Ok(None)
            }
        }
    }

    pub async fn evict(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let removed = self.storage.remove(fingerprint).await?;
        info!(%fingerprint, removed, "cache entry evicted");
        Ok(removed)
    }

    pub async fn prune(&self, max_age: ChronoDuration) -> Result<usize, CacheError> {
        let removed = self.storage.prune_older_than(max_age).await?;
        info!(removed, max_age_secs = max_age.num_seconds(), "cache pruned");
        Ok(removed)
    }
}
