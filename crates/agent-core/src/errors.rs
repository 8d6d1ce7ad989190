use thiserror::Error;

use soulpilot_cache_store::CacheError;
use soulpilot_core_types::SoulError;
use soulpilot_llm::LlmError;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// Setup could not produce a runnable agent (no model, bad CUA routing).
    #[error("agent configuration error: {0}")]
    Configuration(String),

    /// Provider failure that survived any retries.
    #[error(transparent)]
    Llm(LlmError),

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    /// Cooperative stop requested through the pause check.
    #[error("agent run stopped: {0}")]
    Cancelled(String),

    #[error("agent cache error: {0}")]
    Cache(String),

    #[error("{0}")]
    Internal(String),
}

impl AgentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AgentError::Configuration(_))
    }
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ConfigurationMissing(message) => AgentError::Configuration(message),
            other => AgentError::Llm(other),
        }
    }
}

impl From<CacheError> for AgentError {
    fn from(err: CacheError) -> Self {
        AgentError::Cache(err.to_string())
    }
}

impl From<AgentError> for SoulError {
    fn from(err: AgentError) -> Self {
        SoulError::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_llm_configuration_maps_to_configuration() {
        let err: AgentError = LlmError::configuration("no api key").into();
        assert!(err.is_configuration());

        let err: AgentError = LlmError::provider("503", Some(503)).into();
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("503"));
    }
}
