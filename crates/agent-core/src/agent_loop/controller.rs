//! Agent loop controller: prepares a run, drives a backend, builds the result.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use soulpilot_llm::{ChatMessage, ChatRequest};

use super::backend::AgentBackend;
use super::config::AgentLoopConfig;
use super::processor::{StepObserver, StepProcessor};
use super::prompt::build_system_prompt;
use super::stream::EventSender;
use crate::cache::RecordingSession;
use crate::model::AgentResult;
use crate::options::{PauseCheck, StepCallback};
use crate::tools::{ToolContext, ToolSet};

/// Everything one run needs; built by the orchestrator.
pub struct AgentRun {
    pub instruction: String,
    pub system_prompt: Option<String>,
    pub tools: ToolSet,
    pub tool_context: ToolContext,
    pub backend: Arc<dyn AgentBackend>,
    pub on_step: Option<StepCallback>,
    pub check_pause_state: Option<PauseCheck>,
    /// Receives this run's replay steps.
    pub recorder: Option<RecordingSession>,
}

pub struct AgentLoopController {
    config: AgentLoopConfig,
}

impl AgentLoopController {
    pub fn new(config: AgentLoopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    /// Runs to completion. Never returns an error: failures become a
    /// `success: false` result carrying whatever actions were produced.
    pub async fn run(&self, run: AgentRun, events: Option<EventSender>) -> AgentResult {
        let started = Instant::now();
        let backend = run.backend.kind().as_str();

        let start_url = match run.tool_context.page.current_url().await {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "could not resolve the starting page");
                return AgentResult::failed(err, Vec::new())
                    .with_metadata("backend", serde_json::json!(backend));
            }
        };

        let system = build_system_prompt(
            &run.instruction,
            run.system_prompt.as_deref(),
            &run.tools.names(),
            &start_url,
        );
        let request = ChatRequest::new(Some(system), vec![ChatMessage::user(run.instruction.trim())])
            .with_tools(run.tools.definitions());

        info!(
            backend,
            max_steps = self.config.max_steps,
            tools = run.tools.len(),
            %start_url,
            "agent run starting"
        );

        let mut processor = StepProcessor::new(run.tools, run.tool_context, start_url)
            .with_observer(StepObserver {
                on_step: run.on_step,
                events,
            })
            .with_pause_check(run.check_pause_state)
            .with_recorder(run.recorder);
        let outcome = run
            .backend
            .drive(request, &mut processor, self.config.max_steps.max(1))
            .await;
        let result = processor.finish(outcome, backend);

        info!(
            backend,
            success = result.success,
            completed = result.completed,
            actions = result.actions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent run finished"
        );
        result
    }
}
