use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use soulpilot_llm::{ChatCompletion, ChatRequest, LlmClient, StepEvent};

use super::backend::{closes_run, AgentBackend, BackendKind};
use super::processor::StepProcessor;
use crate::errors::AgentError;

/// Delegates iteration to [`LlmClient::run_tool_loop`].
pub struct SdkToolCallingBackend {
    llm: Arc<dyn LlmClient>,
}

impl SdkToolCallingBackend {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AgentBackend for SdkToolCallingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SdkToolCalling
    }

    async fn run_step(&self, request: &ChatRequest) -> Result<ChatCompletion, AgentError> {
        Ok(self.llm.create_chat_completion(request).await?)
    }

    async fn drive(
        &self,
        request: ChatRequest,
        processor: &mut StepProcessor,
        max_steps: u32,
    ) -> Result<(), AgentError> {
        let stop = move |event: &StepEvent| closes_run(event) || event.step >= max_steps;
        let outcome = self.llm.run_tool_loop(&request, processor, &stop).await?;
        debug!(
            steps = outcome.steps,
            aborted = outcome.aborted.is_some(),
            model = %self.llm.model_name(),
            "tool loop finished"
        );
        Ok(())
    }
}
