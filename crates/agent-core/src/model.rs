use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use soulpilot_core_types::now_millis;
use soulpilot_llm::TokenUsage;

/// One observable thing the agent did.
///
/// Built by the step processor, stamped with the page URL and wall-clock time,
/// and never mutated after it lands in [`AgentState::actions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl AgentAction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            reasoning: None,
            task_completed: None,
            time_ms: None,
            extracted: None,
            url: None,
            instruction: None,
            arguments: None,
            page_url: None,
            timestamp: 0,
        }
    }

    pub fn with_reasoning(mut self, reasoning: Option<&str>) -> Self {
        self.reasoning = reasoning
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        self
    }

    /// Returns a copy carrying `page_url` and the current time.
    pub fn stamped(mut self, page_url: &str) -> Self {
        self.page_url = Some(page_url.to_string());
        self.timestamp = now_millis();
        self
    }

    /// Same action with location and time cleared; used to compare runs.
    pub fn unstamped(&self) -> Self {
        Self {
            page_url: None,
            timestamp: 0,
            ..self.clone()
        }
    }
}

/// Loop-scoped mutable state. Owned by exactly one run.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub reasoning: Vec<String>,
    pub actions: Vec<AgentAction>,
    pub final_message: Option<String>,
    pub completed: bool,
    pub task_complete: bool,
    pub current_url: String,
}

impl AgentState {
    pub fn new(current_url: impl Into<String>) -> Self {
        Self {
            current_url: current_url.into(),
            ..Self::default()
        }
    }

    pub fn push_reasoning(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.reasoning.push(text.to_string());
        }
    }

    pub fn latest_reasoning(&self) -> Option<&str> {
        self.reasoning.last().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_input_tokens: u64,
    pub inference_time_ms: u64,
}

impl AgentUsage {
    pub fn from_step(usage: &TokenUsage, inference_ms: u64) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            reasoning_tokens: usage.reasoning_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            inference_time_ms: inference_ms,
        }
    }

    pub fn accumulate(&mut self, usage: &TokenUsage, inference_ms: u64) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.reasoning_tokens += usage.reasoning_tokens;
        self.cached_input_tokens += usage.cached_input_tokens;
        self.inference_time_ms += inference_ms;
    }
}

/// Progress notification delivered to `on_step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStepUpdate {
    pub step: u32,
    pub actions: Vec<AgentAction>,
    pub message: String,
    /// `false` when the step just started, `true` once it finished.
    pub completed: bool,
    pub current_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AgentUsage>,
}

/// Terminal outcome of one `execute` call; also the outcome half of a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub message: String,
    pub actions: Vec<AgentAction>,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AgentUsage>,
}

impl AgentResult {
    /// Folds an error into a failed result while keeping partial progress.
    pub fn failed(reason: impl std::fmt::Display, actions: Vec<AgentAction>) -> Self {
        Self {
            success: false,
            message: format!("Failed to execute task: {reason}"),
            actions,
            completed: false,
            metadata: None,
            usage: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }
}
