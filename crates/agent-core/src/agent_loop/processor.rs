//! Step semantics shared by every backend.
//!
//! [`StepProcessor`] owns the run's [`AgentState`]. Backends only decide how a
//! model response is obtained; what happens to it is decided here, once.

use std::mem;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use soulpilot_core_types::ToolCall;
use soulpilot_llm::{HookAbort, StepEvent, ToolLoopHooks, ToolOutput};

use super::stream::{AgentStreamEvent, EventSender};
use crate::cache::{AgentReplayStep, RecordingSession};
use crate::errors::AgentError;
use crate::metrics::record_inference;
use crate::model::{AgentAction, AgentResult, AgentState, AgentStepUpdate, AgentUsage};
use crate::options::{PauseCheck, StepCallback};
use crate::tools::{ToolContext, ToolError, ToolSet, CLOSE_TOOL};

const TASK_NOT_COMPLETED: &str = "Task could not be completed";
const TASK_COMPLETED: &str = "Task completed successfully";

/// Where step updates go.
#[derive(Clone, Default)]
pub struct StepObserver {
    pub on_step: Option<StepCallback>,
    pub events: Option<EventSender>,
}

impl StepObserver {
    fn step(&self, update: AgentStepUpdate) {
        if let Some(callback) = &self.on_step {
            callback(&update);
        }
        if let Some(events) = &self.events {
            let event = if update.completed {
                AgentStreamEvent::StepFinished(update)
            } else {
                AgentStreamEvent::StepStarted(update)
            };
            let _ = events.send(event);
        }
    }

    fn text(&self, text: &str) {
        if let Some(events) = &self.events {
            let _ = events.send(AgentStreamEvent::TextDelta(text.to_string()));
        }
    }
}

pub struct StepProcessor {
    state: AgentState,
    tools: ToolSet,
    ctx: ToolContext,
    observer: StepObserver,
    pause: Option<PauseCheck>,
    recorder: Option<RecordingSession>,
    step: u32,
    steps_finished: u32,
    step_actions: Vec<AgentAction>,
    step_reasoning_taken: bool,
    usage: AgentUsage,
    stopped: Option<String>,
}

impl StepProcessor {
    pub fn new(tools: ToolSet, ctx: ToolContext, start_url: impl Into<String>) -> Self {
        Self {
            state: AgentState::new(start_url),
            tools,
            ctx,
            observer: StepObserver::default(),
            pause: None,
            recorder: None,
            step: 0,
            steps_finished: 0,
            step_actions: Vec::new(),
            step_reasoning_taken: false,
            usage: AgentUsage::default(),
            stopped: None,
        }
    }

    pub fn with_observer(mut self, observer: StepObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_pause_check(mut self, pause: Option<PauseCheck>) -> Self {
        self.pause = pause;
        self
    }

    /// Tool invocations are recorded into `session`.
    pub fn with_recorder(mut self, session: Option<RecordingSession>) -> Self {
        self.recorder = session;
        self
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn steps_finished(&self) -> u32 {
        self.steps_finished
    }

    pub fn stopped(&self) -> Option<&str> {
        self.stopped.as_deref()
    }

    async fn refresh_url(&mut self) -> String {
        match self.ctx.page.current_url().await {
            Ok(url) => self.state.current_url = url,
            Err(err) => debug!(error = %err, "could not refresh page url"),
        }
        self.state.current_url.clone()
    }

    fn record(&self, call: &ToolCall, actions: &[AgentAction], reasoning: Option<&str>) {
        if let Some(session) = &self.recorder {
            session.record_step(AgentReplayStep {
                tool: call.tool.clone(),
                arguments: call.arguments.clone(),
                actions: actions.iter().map(AgentAction::unstamped).collect(),
                reasoning: reasoning.map(str::to_string),
            });
        }
    }

    fn append(&mut self, actions: Vec<AgentAction>) {
        self.state.actions.extend(actions.iter().cloned());
        self.step_actions.extend(actions);
    }

    fn close(&mut self, call: &ToolCall) -> ToolOutput {
        let task_complete = call.bool_arg("taskComplete").unwrap_or(false);
        let close_reasoning = call.str_arg("reasoning");
        self.state.completed = true;
        self.state.task_complete = task_complete;
        self.state.final_message = Some(if task_complete {
            let mut parts = self.state.reasoning.clone();
            parts.extend(close_reasoning.map(str::to_string));
            if parts.is_empty() {
                TASK_COMPLETED.to_string()
            } else {
                parts.join(" ")
            }
        } else {
            TASK_NOT_COMPLETED.to_string()
        });
        info!(step = self.step, task_complete, "agent closed the task");

        let mut action = AgentAction::new(CLOSE_TOOL).with_reasoning(close_reasoning);
        action.task_completed = Some(task_complete);
        let actions = vec![action.stamped(&self.state.current_url)];
        self.record(call, &actions, close_reasoning);
        self.append(actions);
        ToolOutput::ok(call, json!({ "success": true }))
    }

    /// Builds the terminal result. Errors fold into a failed result that keeps
    /// every action produced so far.
    pub fn finish(self, outcome: Result<(), AgentError>, backend: &str) -> AgentResult {
        let steps = self.steps_finished;
        let result = match outcome {
            Ok(()) => {
                let message = self
                    .state
                    .final_message
                    .clone()
                    .or_else(|| {
                        self.stopped
                            .as_ref()
                            .map(|reason| AgentError::cancelled(reason.as_str()).to_string())
                    })
                    .or_else(|| {
                        (!self.state.reasoning.is_empty()).then(|| self.state.reasoning.join(" "))
                    })
                    .unwrap_or_else(|| TASK_NOT_COMPLETED.to_string());
                AgentResult {
                    success: self.state.completed && self.state.task_complete,
                    message,
                    actions: self.state.actions,
                    completed: self.state.completed,
                    metadata: None,
                    usage: None,
                }
            }
            Err(err) => {
                warn!(error = %err, steps, "agent run failed");
                AgentResult::failed(&err, self.state.actions)
            }
        };
        let mut result = result
            .with_metadata("steps", json!(steps))
            .with_metadata("backend", json!(backend));
        if let Some(reason) = self.stopped {
            result = result.with_metadata("stoppedReason", json!(reason));
        }
        result.usage = Some(self.usage);
        result
    }
}

#[async_trait]
impl ToolLoopHooks for StepProcessor {
    async fn before_step(&mut self, step: u32) -> Result<(), HookAbort> {
        self.step = step;
        self.step_actions.clear();
        self.step_reasoning_taken = false;
        self.observer.step(AgentStepUpdate {
            step,
            actions: Vec::new(),
            message: format!("Starting step {step}"),
            completed: false,
            current_url: self.state.current_url.clone(),
            usage: None,
        });

        if let Some(check) = &self.pause {
            if let Err(reason) = check().await {
                info!(step, %reason, "pause check stopped the run");
                self.stopped = Some(reason.clone());
                return Err(HookAbort(reason));
            }
        }
        Ok(())
    }

    async fn execute_tool(&mut self, call: &ToolCall, reasoning: Option<&str>) -> ToolOutput {
        if !self.step_reasoning_taken {
            if let Some(text) = reasoning {
                self.state.push_reasoning(text);
            }
            self.step_reasoning_taken = true;
        }

        if call.tool == CLOSE_TOOL {
            return self.close(call);
        }

        let Some(tool) = self.tools.get(&call.tool).cloned() else {
            let err = ToolError::Unknown(call.tool.clone());
            warn!(step = self.step, tool = %call.tool, "model requested an unknown tool");
            return ToolOutput::error(call, err.to_string());
        };

        match tool.execute(&self.ctx, &call.arguments).await {
            Ok(output) => {
                let url = self.refresh_url().await;
                let actions: Vec<AgentAction> = tool
                    .actions_for(call, &output)
                    .into_iter()
                    .map(|action| {
                        let action = if action.reasoning.is_none() {
                            action.with_reasoning(reasoning)
                        } else {
                            action
                        };
                        action.stamped(&url)
                    })
                    .collect();
                debug!(step = self.step, tool = %call.tool, actions = actions.len(), "tool executed");
                self.record(call, &actions, reasoning);
                self.append(actions);
                ToolOutput::ok(call, output)
            }
            Err(err) => {
                warn!(step = self.step, tool = %call.tool, error = %err, "tool execution failed");
                ToolOutput::error(call, err.to_string())
            }
        }
    }

    async fn after_step(&mut self, event: &StepEvent) {
        self.usage.accumulate(&event.usage, event.inference_ms);
        record_inference("agent", &event.usage, event.inference_ms);
        self.steps_finished = event.step;

        if let Some(text) = event.text.as_deref() {
            if !self.step_reasoning_taken {
                self.state.push_reasoning(text);
                self.step_reasoning_taken = true;
            }
            self.observer.text(text);
        }

        let current_url = self.refresh_url().await;
        let message = self
            .state
            .final_message
            .clone()
            .or_else(|| self.state.latest_reasoning().map(str::to_string))
            .unwrap_or_default();
        self.observer.step(AgentStepUpdate {
            step: event.step,
            actions: mem::take(&mut self.step_actions),
            message,
            completed: true,
            current_url,
            usage: Some(AgentUsage::from_step(&event.usage, event.inference_ms)),
        });
    }
}
