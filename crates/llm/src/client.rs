use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use soulpilot_core_types::ToolCall;

use crate::errors::LlmError;
use crate::json::parse_structured;
use crate::types::{
    ChatCompletion, ChatMessage, ChatRequest, ObjectSchema, StepEvent, TokenUsage, ToolOutput,
};

/// Evaluated after every step of [`LlmClient::run_tool_loop`]; `true` ends the loop.
pub type StopPredicate = dyn Fn(&StepEvent) -> bool + Send + Sync;

/// Returned by a hook to end the tool loop early without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookAbort(pub String);

/// Side-effecting collaborators the tool loop calls into.
#[async_trait]
pub trait ToolLoopHooks: Send {
    /// Runs before the model is queried for `step` (1-based).
    async fn before_step(&mut self, step: u32) -> Result<(), HookAbort>;

    /// Executes one tool call. `reasoning` is the text the model sent alongside it.
    async fn execute_tool(&mut self, call: &ToolCall, reasoning: Option<&str>) -> ToolOutput;

    /// Runs once per finished step, after every tool call of that step executed.
    async fn after_step(&mut self, event: &StepEvent);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolLoopOutcome {
    pub steps: u32,
    pub usage: TokenUsage,
    pub inference_ms: u64,
    pub final_text: Option<String>,
    pub aborted: Option<HookAbort>,
}

/// Retry policy for [`LlmClient::generate_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredOutputPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for StructuredOutputPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

/// Uniform capability interface over heterogeneous providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    /// One non-streaming completion, possibly carrying tool calls.
    async fn create_chat_completion(&self, request: &ChatRequest)
        -> Result<ChatCompletion, LlmError>;

    fn structured_output_policy(&self) -> StructuredOutputPolicy {
        StructuredOutputPolicy::default()
    }

    /// Iterates completion → tool execution until the model stops calling tools,
    /// `stop` returns true, or a hook aborts.
    async fn run_tool_loop(
        &self,
        request: &ChatRequest,
        hooks: &mut dyn ToolLoopHooks,
        stop: &StopPredicate,
    ) -> Result<ToolLoopOutcome, LlmError> {
        let mut messages = request.messages.clone();
        let mut usage = TokenUsage::default();
        let mut inference_ms = 0u64;
        let mut step = 0u32;

        loop {
            step += 1;
            if let Err(abort) = hooks.before_step(step).await {
                debug!(step, reason = %abort.0, "tool loop aborted by hook");
                return Ok(ToolLoopOutcome {
                    steps: step - 1,
                    usage,
                    inference_ms,
                    final_text: None,
                    aborted: Some(abort),
                });
            }

            let started = Instant::now();
            let completion = self
                .create_chat_completion(&request.with_messages(messages.clone()))
                .await?;
            let elapsed = started.elapsed().as_millis() as u64;
            inference_ms += elapsed;
            usage += completion.usage;

            let mut results = Vec::with_capacity(completion.tool_calls.len());
            for call in &completion.tool_calls {
                results.push(hooks.execute_tool(call, completion.text.as_deref()).await);
            }

            messages.push(ChatMessage::assistant(
                completion.text.clone(),
                &completion.tool_calls,
            ));
            if !results.is_empty() {
                messages.push(ChatMessage::tool_results(&results));
            }

            let event = StepEvent {
                step,
                text: completion.text.clone(),
                tool_calls: completion.tool_calls.clone(),
                tool_results: results,
                stop_reason: completion.stop_reason.clone(),
                usage: completion.usage,
                inference_ms: elapsed,
            };
            hooks.after_step(&event).await;

            if completion.tool_calls.is_empty() || stop(&event) {
                return Ok(ToolLoopOutcome {
                    steps: step,
                    usage,
                    inference_ms,
                    final_text: completion.text,
                    aborted: None,
                });
            }
        }
    }

    /// Asks for a JSON object matching `schema`, retrying malformed or transient
    /// failures with doubling backoff.
    async fn generate_object(
        &self,
        request: &ChatRequest,
        schema: &ObjectSchema,
    ) -> Result<Value, LlmError> {
        let policy = self.structured_output_policy();
        let directive = format!(
            "Respond with a single JSON object named '{}' that matches this JSON schema. \
             Do not add commentary.\n{}",
            schema.name, schema.schema
        );
        let system = match request.system.as_deref() {
            Some(system) => format!("{system}\n\n{directive}"),
            None => directive,
        };
        let request = ChatRequest {
            system: Some(system),
            tools: Vec::new(),
            ..request.clone()
        };

        let attempts = policy.max_attempts.max(1);
        let mut delay = policy.initial_backoff;
        let mut last_error = LlmError::malformed("structured output never attempted");
        for attempt in 1..=attempts {
            let outcome = self
                .create_chat_completion(&request)
                .await
                .and_then(|completion| parse_structured(completion.text.as_deref(), schema));
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        attempt,
                        remaining = attempts - attempt,
                        error = %err,
                        schema = %schema.name,
                        "structured output attempt failed; retrying"
                    );
                    last_error = err;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }
}
