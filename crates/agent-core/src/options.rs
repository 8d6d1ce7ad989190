use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::model::AgentStepUpdate;
use crate::page::PageHandle;
use crate::tools::{AgentTool, ToolProvider};

pub const DEFAULT_MAX_STEPS: u32 = 20;

/// Receives every step update synchronously, in order.
pub type StepCallback = Arc<dyn Fn(&AgentStepUpdate) + Send + Sync>;

/// Checked once per step boundary; an `Err` stops the run cooperatively.
pub type PauseCheck = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// How an agent handle behaves across executions.
#[derive(Clone, Default)]
pub struct AgentConfig {
    /// Replaces the built-in system prompt; a completion directive is still appended.
    pub system_prompt: Option<String>,
    pub integrations: Vec<Arc<dyn ToolProvider>>,
    pub tools: Vec<Arc<dyn AgentTool>>,
    /// Route to the registered computer-use backend.
    pub cua: bool,
    pub model: Option<String>,
    /// Model used by tools that call inference themselves; defaults to `model`.
    pub execution_model: Option<String>,
    pub stream: bool,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn execution_model(mut self, model: impl Into<String>) -> Self {
        self.execution_model = Some(model.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool(mut self, tool: Arc<dyn AgentTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn integration(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.integrations.push(provider);
        self
    }

    pub fn cua(mut self, enabled: bool) -> Self {
        self.cua = enabled;
        self
    }

    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("system_prompt", &self.system_prompt)
            .field(
                "integrations",
                &self.integrations.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("cua", &self.cua)
            .field("model", &self.model)
            .field("execution_model", &self.execution_model)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Per-call options for [`AgentHandle::execute`](crate::orchestrator::AgentHandle::execute).
#[derive(Clone)]
pub struct AgentExecuteOptions {
    pub instruction: String,
    pub max_steps: u32,
    /// Page to drive; falls back to the orchestrator's active page.
    pub page: Option<PageHandle>,
    pub on_step: Option<StepCallback>,
    pub check_pause_state: Option<PauseCheck>,
}

impl AgentExecuteOptions {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            max_steps: DEFAULT_MAX_STEPS,
            page: None,
            on_step: None,
            check_pause_state: None,
        }
    }

    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn page(mut self, page: PageHandle) -> Self {
        self.page = Some(page);
        self
    }

    pub fn on_step(mut self, callback: impl Fn(&AgentStepUpdate) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Arc::new(callback));
        self
    }

    pub fn check_pause_state<F>(mut self, check: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static,
    {
        self.check_pause_state = Some(Arc::new(check));
        self
    }
}

impl From<&str> for AgentExecuteOptions {
    fn from(instruction: &str) -> Self {
        Self::new(instruction)
    }
}

impl From<String> for AgentExecuteOptions {
    fn from(instruction: String) -> Self {
        Self::new(instruction)
    }
}

impl fmt::Debug for AgentExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentExecuteOptions")
            .field("instruction", &self.instruction)
            .field("max_steps", &self.max_steps)
            .field("page", &self.page.is_some())
            .field("on_step", &self.on_step.is_some())
            .field("check_pause_state", &self.check_pause_state.is_some())
            .finish()
    }
}
