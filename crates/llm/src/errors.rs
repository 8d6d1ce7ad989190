use thiserror::Error;

use soulpilot_core_types::SoulError;

/// Errors emitted by LLM clients.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// No model could be resolved (missing key, unknown provider). Never retried.
    #[error("llm configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Network or HTTP failure talking to the provider.
    #[error("provider request failed: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },

    /// The model answered, but not in the shape we asked for.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

impl LlmError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationMissing(message.into())
    }

    pub fn provider(message: impl Into<String>, status: Option<u16>) -> Self {
        let retryable = match status {
            None => true,
            Some(code) => code == 408 || code == 429 || code >= 500,
        };
        Self::Provider {
            message: message.into(),
            status,
            retryable,
        }
    }

    pub fn fatal_provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            status: None,
            retryable: false,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::ConfigurationMissing(_) => false,
            LlmError::Provider { retryable, .. } => *retryable,
            LlmError::MalformedOutput(_) => true,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, LlmError::ConfigurationMissing(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|status| status.as_u16());
        LlmError::provider(err.to_string(), status)
    }
}

impl From<LlmError> for SoulError {
    fn from(value: LlmError) -> Self {
        SoulError::new(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(!LlmError::configuration("no key").is_retryable());
        assert!(LlmError::provider("timeout", None).is_retryable());
        assert!(LlmError::provider("rate limited", Some(429)).is_retryable());
        assert!(LlmError::provider("upstream", Some(503)).is_retryable());
        assert!(!LlmError::provider("bad request", Some(400)).is_retryable());
        assert!(LlmError::malformed("not json").is_retryable());
        assert!(!LlmError::fatal_provider("unsupported").is_retryable());
    }
}
