//! Agent replay cache: fingerprints, replay scripts, recording sessions.

pub mod agent_cache;
pub mod fingerprint;
pub mod replay;

pub use agent_cache::{AgentCache, CacheContext, CacheInput, FlightGuard, RecordingSession};
pub use fingerprint::{
    build_config_signature, compute_fingerprint, normalize_instruction, should_attempt_cache,
    signature_with_tools, SanitizedOptions,
};
pub use replay::{replay_steps, AgentReplayStep, CachedAgentEntry};
