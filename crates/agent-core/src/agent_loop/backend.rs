use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use soulpilot_core_types::ToolCall;
use soulpilot_llm::{ChatCompletion, ChatMessage, ChatRequest, StepEvent, ToolLoopHooks};

use super::processor::StepProcessor;
use crate::errors::AgentError;
use crate::tools::CLOSE_TOOL;

/// How model responses are obtained for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The client's own iterate-until-stop tool loop.
    SdkToolCalling,
    /// One raw REST request per step, looped here.
    DirectRest,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::SdkToolCalling => "sdk_tool_calling",
            BackendKind::DirectRest => "direct_rest",
        }
    }
}

/// True once a step called the reserved `close` tool.
pub fn closes_run(event: &StepEvent) -> bool {
    event.called(CLOSE_TOOL)
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// One model round-trip over the transcript in `request`.
    async fn run_step(&self, request: &ChatRequest) -> Result<ChatCompletion, AgentError>;

    fn extract_tool_calls(&self, completion: &ChatCompletion) -> Vec<ToolCall> {
        completion.tool_calls.clone()
    }

    fn is_stop_condition(&self, event: &StepEvent) -> bool {
        closes_run(event)
    }

    /// Runs steps until the model stops calling tools, a stop condition holds,
    /// the pause check rejects, or `max_steps` is reached.
    async fn drive(
        &self,
        request: ChatRequest,
        processor: &mut StepProcessor,
        max_steps: u32,
    ) -> Result<(), AgentError> {
        let mut messages = request.messages.clone();
        for step in 1..=max_steps {
            if processor.before_step(step).await.is_err() {
                return Ok(());
            }

            let started = Instant::now();
            let completion = self.run_step(&request.with_messages(messages.clone())).await?;
            let inference_ms = started.elapsed().as_millis() as u64;
            let calls = self.extract_tool_calls(&completion);

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(processor.execute_tool(call, completion.text.as_deref()).await);
            }

            messages.push(ChatMessage::assistant(completion.text.clone(), &calls));
            if !results.is_empty() {
                messages.push(ChatMessage::tool_results(&results));
            }

            let event = StepEvent {
                step,
                text: completion.text.clone(),
                tool_calls: calls,
                tool_results: results,
                stop_reason: completion.stop_reason.clone(),
                usage: completion.usage,
                inference_ms,
            };
            processor.after_step(&event).await;

            if event.tool_calls.is_empty() || self.is_stop_condition(&event) {
                debug!(step, backend = self.kind().as_str(), "agent loop stopped");
                return Ok(());
            }
        }
        debug!(max_steps, backend = self.kind().as_str(), "agent loop reached max steps");
        Ok(())
    }
}
