use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use soulpilot_core_types::ToolCall;
use soulpilot_llm::anthropic::{build_messages_body, parse_messages_response};
use soulpilot_llm::{AnthropicConfig, ChatCompletion, ChatRequest, RestTransport};

use super::backend::{AgentBackend, BackendKind};
use super::config::RetryPolicy;
use crate::errors::AgentError;

/// Messages endpoint reached without a tool-calling SDK, typically with an OAuth token.
#[derive(Clone)]
pub struct RestEndpoint {
    pub config: AnthropicConfig,
    pub transport: Arc<dyn RestTransport>,
}

impl std::fmt::Debug for RestEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestEndpoint")
            .field("model", &self.config.model)
            .field("api_base", &self.config.api_base)
            .finish()
    }
}

/// Issues one request per step and loops manually, retrying transient failures.
pub struct DirectRestBackend {
    endpoint: RestEndpoint,
    retry: RetryPolicy,
}

impl DirectRestBackend {
    pub fn new(endpoint: RestEndpoint, retry: RetryPolicy) -> Self {
        Self { endpoint, retry }
    }
}

#[async_trait]
impl AgentBackend for DirectRestBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DirectRest
    }

    async fn run_step(&self, request: &ChatRequest) -> Result<ChatCompletion, AgentError> {
        let config = &self.endpoint.config;
        let url = config.messages_url();
        let headers = config.auth.headers();
        let body = build_messages_body(config, request);

        let attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;
        loop {
            let outcome = match self.endpoint.transport.post_json(&url, &headers, &body).await {
                Ok(raw) => parse_messages_response(&raw),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        attempt,
                        remaining = attempts - attempt,
                        error = %err,
                        "direct REST step failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Tool-use blocks without an id get one so results can reference them.
    fn extract_tool_calls(&self, completion: &ChatCompletion) -> Vec<ToolCall> {
        completion
            .tool_calls
            .iter()
            .filter(|call| !call.tool.trim().is_empty())
            .map(|call| {
                if call.call_id.trim().is_empty() {
                    ToolCall::with_generated_id(call.tool.clone(), call.arguments.clone())
                } else {
                    call.clone()
                }
            })
            .collect()
    }
}
