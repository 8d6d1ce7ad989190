//! Configuration for the agent execution loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::DEFAULT_MAX_STEPS;

/// Retry policy for the direct REST backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first.
    /// Default: 3
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    /// Default: 500ms
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Ceiling on model round-trips when `close` is never called.
    /// Default: 20
    pub max_steps: u32,

    pub rest_retry: RetryPolicy,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            rest_retry: RetryPolicy::default(),
        }
    }
}

impl AgentLoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set max steps. Zero is raised to one.
    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps.max(1);
        self
    }

    pub fn rest_retry(mut self, policy: RetryPolicy) -> Self {
        self.rest_retry = policy;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
