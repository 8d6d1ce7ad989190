use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{LlmClient, StructuredOutputPolicy};
use crate::errors::LlmError;
use crate::types::{ChatCompletion, ChatRequest};

/// Deterministic client that replays queued completions in order.
///
/// Used by tests and offline runs. When the queue drains it answers with a
/// plain "done" text so tool loops terminate.
pub struct ScriptedLlmClient {
    provider: String,
    model: String,
    replies: Mutex<VecDeque<Result<ChatCompletion, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    policy: StructuredOutputPolicy,
}

impl ScriptedLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: "scripted".to_string(),
            model: model.into(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            policy: StructuredOutputPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
            },
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_policy(mut self, policy: StructuredOutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn reply(self, completion: ChatCompletion) -> Self {
        self.replies.lock().push_back(Ok(completion));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn push(&self, reply: Result<ChatCompletion, LlmError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn structured_output_policy(&self) -> StructuredOutputPolicy {
        self.policy
    }

    async fn create_chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, LlmError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatCompletion::text("done")))
    }
}
