use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, warn};

use soulpilot_cache_store::CacheStorage;

use super::fingerprint::{compute_fingerprint, should_attempt_cache, SanitizedOptions};
use super::replay::{replay_steps, AgentReplayStep, CachedAgentEntry, ENTRY_VERSION};
use crate::errors::AgentError;
use crate::metrics::record_cache_event;
use crate::model::{AgentResult, AgentUsage};
use crate::options::AgentExecuteOptions;
use crate::tools::{ToolContext, ToolSet};

/// Inputs to [`AgentCache::prepare_context`].
#[derive(Debug, Clone, Copy)]
pub struct CacheInput<'a> {
    pub instruction: &'a str,
    pub options: &'a AgentExecuteOptions,
    pub config_signature: &'a str,
    pub start_url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheContext {
    pub instruction: String,
    pub options: SanitizedOptions,
    pub config_signature: String,
    pub start_url: String,
    pub fingerprint: String,
}

/// Replay cache for agent runs, layered over a [`CacheStorage`].
///
/// Holds the in-flight set that lets at most one caller record a given
/// fingerprint at a time, and tracks the recording session each flight owns.
pub struct AgentCache {
    storage: Arc<dyn CacheStorage>,
    enabled: bool,
    sessions: Arc<DashMap<String, Weak<SessionInner>>>,
    in_flight: Arc<DashSet<String>>,
}

impl AgentCache {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            storage,
            enabled: true,
            sessions: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn disabled(storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            enabled: false,
            ..Self::new(storage)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn prepare_context(&self, input: CacheInput<'_>) -> Option<CacheContext> {
        if !self.enabled {
            return None;
        }
        if !should_attempt_cache(input.instruction) {
            debug!(target: "agent_cache", "instruction not eligible for caching");
            record_cache_event("skip");
            return None;
        }
        let options = SanitizedOptions::from(input.options);
        let fingerprint = compute_fingerprint(
            input.instruction,
            &options,
            input.config_signature,
            input.start_url,
        );
        Some(CacheContext {
            instruction: input.instruction.to_string(),
            options,
            config_signature: input.config_signature.to_string(),
            start_url: input.start_url.to_string(),
            fingerprint,
        })
    }

    pub async fn load(&self, fingerprint: &str) -> Option<CachedAgentEntry> {
        let bytes = match self.storage.get(fingerprint).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(target: "agent_cache", %fingerprint, error = %err, "cache read failed");
                record_cache_event("error");
                return None;
            }
        };
        match serde_json::from_slice::<CachedAgentEntry>(&bytes) {
            Ok(entry) if entry.version == ENTRY_VERSION => Some(entry),
            Ok(entry) => {
                debug!(target: "agent_cache", %fingerprint, version = entry.version, "cache entry version mismatch");
                None
            }
            Err(err) => {
                warn!(target: "agent_cache", %fingerprint, error = %err, "cache entry unreadable");
                record_cache_event("error");
                None
            }
        }
    }

    /// Replays a stored run against the current page. `Ok(None)` is a miss.
    ///
    /// An `Err` means a replayed step failed after earlier steps may already
    /// have changed the page. Never writes to storage.
    pub async fn try_replay(
        &self,
        context: &CacheContext,
        tools: &ToolSet,
        ctx: &ToolContext,
    ) -> Result<Option<AgentResult>, AgentError> {
        let Some(entry) = self.load(&context.fingerprint).await else {
            record_cache_event("miss");
            return Ok(None);
        };
        match replay_steps(&entry.steps, tools, ctx).await {
            Ok(actions) => {
                info!(
                    target: "agent_cache",
                    fingerprint = %context.fingerprint,
                    steps = entry.steps.len(),
                    "replayed cached agent run"
                );
                record_cache_event("hit");
                let mut result = entry.result;
                result.actions = actions;
                result.usage = Some(AgentUsage::default());
                Ok(Some(
                    result
                        .with_metadata("cacheHit", json!(true))
                        .with_metadata("fingerprint", json!(context.fingerprint)),
                ))
            }
            Err(err) => {
                warn!(
                    target: "agent_cache",
                    fingerprint = %context.fingerprint,
                    error = %err,
                    "replay failed"
                );
                record_cache_event("replay_failed");
                Err(err)
            }
        }
    }

    /// Removes the entry for `context`. Returns whether one existed.
    pub async fn evict(&self, context: &CacheContext) -> bool {
        match self.storage.remove(&context.fingerprint).await {
            Ok(removed) => {
                if removed {
                    debug!(target: "agent_cache", fingerprint = %context.fingerprint, "evicted agent replay");
                    record_cache_event("evict");
                }
                removed
            }
            Err(err) => {
                warn!(target: "agent_cache", fingerprint = %context.fingerprint, error = %err, "cache eviction failed");
                record_cache_event("error");
                false
            }
        }
    }

    /// Opens the recording session owned by `flight`. Sessions of different
    /// flights never share steps.
    pub fn begin_recording(&self, flight: FlightGuard) -> RecordingSession {
        let fingerprint = flight.fingerprint.clone();
        let inner = Arc::new(SessionInner {
            steps: Mutex::new(Some(Vec::new())),
            sessions: self.sessions.clone(),
            flight,
        });
        self.sessions.insert(fingerprint, Arc::downgrade(&inner));
        RecordingSession { inner }
    }

    pub fn active_recordings(&self) -> usize {
        self.sessions.len()
    }

    /// Drops every open session's steps. Safe to call with none open.
    pub fn discard_recording(&self) {
        let open: Vec<Arc<SessionInner>> = self
            .sessions
            .iter()
            .filter_map(|session| session.value().upgrade())
            .collect();
        for session in open {
            session.steps.lock().take();
        }
    }

    /// Persists a successful run with at least one step. Returns whether it was written.
    pub async fn store(
        &self,
        context: &CacheContext,
        steps: Vec<AgentReplayStep>,
        result: &AgentResult,
    ) -> bool {
        if !result.success || steps.is_empty() {
            debug!(
                target: "agent_cache",
                success = result.success,
                steps = steps.len(),
                "run not eligible for storing"
            );
            return false;
        }
        let mut outcome = result.clone();
        outcome.usage = None;
        let entry = CachedAgentEntry {
            version: ENTRY_VERSION,
            fingerprint: context.fingerprint.clone(),
            instruction: context.instruction.clone(),
            start_url: context.start_url.clone(),
            options: context.options,
            steps,
            result: outcome,
            created_at: Utc::now(),
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(target: "agent_cache", error = %err, "failed to encode cache entry");
                return false;
            }
        };
        match self.storage.put(&context.fingerprint, &bytes).await {
            Ok(()) => {
                info!(
                    target: "agent_cache",
                    fingerprint = %context.fingerprint,
                    steps = entry.steps.len(),
                    "stored agent replay"
                );
                record_cache_event("store");
                true
            }
            Err(err) => {
                warn!(target: "agent_cache", error = %err, "failed to persist agent replay");
                record_cache_event("error");
                false
            }
        }
    }

    /// Grants the recording flight for `fingerprint`, or `None` if another caller holds it.
    pub fn claim_flight(&self, fingerprint: &str) -> Option<FlightGuard> {
        if self.in_flight.insert(fingerprint.to_string()) {
            Some(FlightGuard {
                fingerprint: fingerprint.to_string(),
                in_flight: self.in_flight.clone(),
            })
        } else {
            debug!(target: "agent_cache", %fingerprint, "recording flight already claimed");
            None
        }
    }
}

/// One run's recording. Clones share the same buffer.
#[derive(Clone)]
pub struct RecordingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    steps: Mutex<Option<Vec<AgentReplayStep>>>,
    sessions: Arc<DashMap<String, Weak<SessionInner>>>,
    flight: FlightGuard,
}

impl RecordingSession {
    pub fn fingerprint(&self) -> &str {
        self.inner.flight.fingerprint()
    }

    /// No-op once the session has ended or been discarded.
    pub fn record_step(&self, step: AgentReplayStep) {
        if let Some(steps) = self.inner.steps.lock().as_mut() {
            steps.push(step);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.steps.lock().is_some()
    }

    pub fn end_recording(&self) -> Vec<AgentReplayStep> {
        self.inner.steps.lock().take().unwrap_or_default()
    }

    pub fn discard(&self) {
        self.inner.steps.lock().take();
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.sessions.remove(self.flight.fingerprint());
    }
}

/// Releases the in-flight claim when dropped.
#[derive(Debug)]
pub struct FlightGuard {
    fingerprint: String,
    in_flight: Arc<DashSet<String>>,
}

impl FlightGuard {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentAction;
    use soulpilot_cache_store::MemoryCacheStorage;

    fn cache() -> AgentCache {
        AgentCache::new(Arc::new(MemoryCacheStorage::new()))
    }

    fn context(cache: &AgentCache, instruction: &str) -> Option<CacheContext> {
        let options = AgentExecuteOptions::new(instruction);
        cache.prepare_context(CacheInput {
            instruction,
            options: &options,
            config_signature: "sig",
            start_url: "about:blank",
        })
    }

    fn success() -> AgentResult {
        AgentResult {
            success: true,
            message: "done".into(),
            actions: vec![AgentAction::new("close")],
            completed: true,
            metadata: None,
            usage: None,
        }
    }

    #[test]
    fn disabled_cache_prepares_nothing() {
        let cache = AgentCache::disabled(Arc::new(MemoryCacheStorage::new()));
        assert!(context(&cache, "open example.com").is_none());
        assert!(context(&self::cache(), "open example.com").is_some());
        assert!(context(&self::cache(), "what time is it right now").is_none());
    }

    fn step(tool: &str) -> AgentReplayStep {
        AgentReplayStep {
            tool: tool.into(),
            arguments: json!({}),
            actions: vec![AgentAction::new(tool)],
            reasoning: None,
        }
    }

    #[test]
    fn recording_session_lifecycle() {
        let cache = cache();
        cache.discard_recording();
        assert_eq!(cache.active_recordings(), 0);

        let session = cache.begin_recording(cache.claim_flight("fp").expect("flight"));
        assert!(session.is_active());
        assert_eq!(cache.active_recordings(), 1);
        session.record_step(step("close"));
        assert_eq!(session.end_recording().len(), 1);
        assert!(!session.is_active());
        session.record_step(step("goto"));
        assert!(session.end_recording().is_empty());

        drop(session);
        assert_eq!(cache.active_recordings(), 0);
        assert!(cache.claim_flight("fp").is_some(), "ending the session releases the flight");
    }

    #[test]
    fn concurrent_sessions_keep_their_own_steps() {
        let cache = cache();
        let first = cache.begin_recording(cache.claim_flight("a").expect("flight a"));
        let second = cache.begin_recording(cache.claim_flight("b").expect("flight b"));

        first.record_step(step("goto"));
        second.record_step(step("click"));
        first.record_step(step("close"));

        let first_tools: Vec<String> = first.end_recording().into_iter().map(|s| s.tool).collect();
        let second_tools: Vec<String> = second.end_recording().into_iter().map(|s| s.tool).collect();
        assert_eq!(first_tools, vec!["goto", "close"]);
        assert_eq!(second_tools, vec!["click"]);
    }

    #[test]
    fn discard_clears_every_open_session() {
        let cache = cache();
        let session = cache.begin_recording(cache.claim_flight("fp").expect("flight"));
        session.record_step(step("goto"));
        cache.discard_recording();
        assert!(!session.is_active());
        assert!(session.end_recording().is_empty());
    }

    #[tokio::test]
    async fn store_rejects_failed_or_empty_runs() {
        let cache = cache();
        let ctx = context(&cache, "open example.com").expect("context");
        assert!(!cache.store(&ctx, Vec::new(), &success()).await);
        let mut failed = success();
        failed.success = false;
        assert!(!cache.store(&ctx, vec![step("close")], &failed).await);
        assert!(cache.store(&ctx, vec![step("close")], &success()).await);
        assert!(cache.load(&ctx.fingerprint).await.is_some());

        assert!(cache.evict(&ctx).await);
        assert!(cache.load(&ctx.fingerprint).await.is_none());
        assert!(!cache.evict(&ctx).await);
    }

    #[test]
    fn flights_are_exclusive_per_fingerprint() {
        let cache = cache();
        let first = cache.claim_flight("fp").expect("first claim");
        assert!(cache.claim_flight("fp").is_none());
        assert!(cache.claim_flight("other").is_some());
        assert_eq!(first.fingerprint(), "fp");
        drop(first);
        assert!(cache.claim_flight("fp").is_some());
    }
}
