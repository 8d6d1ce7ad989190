//! Tools the agent can call.
//!
//! A run sees one merged [`ToolSet`]: the built-in browser tools first, then
//! caller-supplied tools, then tools contributed by integrations.

pub mod builtin;
pub mod provider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use soulpilot_core_types::ToolCall;
use soulpilot_llm::{LlmClient, LlmError, ToolDefinition};

use crate::model::AgentAction;
use crate::page::{PageError, PageHandle};

pub use builtin::{builtin_tools, CLOSE_TOOL};
pub use provider::ToolProvider;

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Decodes tool arguments; a missing argument object reads as `{}`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

/// What a tool may touch while it runs.
#[derive(Clone)]
pub struct ToolContext {
    pub page: PageHandle,
    /// Model used by tools that need inference of their own, such as `extract`.
    pub execution_model: Arc<dyn LlmClient>,
}

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError>;

    /// Maps a successful result into the actions reported to the caller.
    fn actions_for(&self, call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        let mut action = AgentAction::new(self.name());
        if !call.arguments.is_null() {
            action.arguments = Some(call.arguments.clone());
        }
        vec![action]
    }

    /// Read-only tools are skipped during replay and their recorded actions reused.
    fn replays(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Ordered, name-unique set of tools.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn AgentTool>>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut set = Self::new();
        for tool in builtin_tools() {
            set.insert(tool, "builtin");
        }
        set
    }

    /// Adds `tool` unless the name is taken; the first registration wins.
    pub fn insert(&mut self, tool: Arc<dyn AgentTool>, source: &str) -> bool {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            warn!(tool = %name, %source, "duplicate tool name rejected");
            return false;
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        true
    }

    /// Built-ins, then caller tools, then integration tools (by provider id).
    pub fn assemble(
        caller_tools: &[Arc<dyn AgentTool>],
        integration_tools: Vec<(String, Vec<Arc<dyn AgentTool>>)>,
    ) -> Self {
        let mut set = Self::builtin();
        for tool in caller_tools {
            set.insert(tool.clone(), "caller");
        }
        for (provider, tools) in integration_tools {
            for tool in tools {
                set.insert(tool, &provider);
            }
        }
        set
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.index.get(name).map(|idx| &self.tools[*idx])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool(&'static str);

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
            Ok(arguments.clone())
        }
    }

    #[test]
    fn builtins_win_over_duplicates() {
        let set = ToolSet::assemble(
            &[Arc::new(EchoTool("goto")), Arc::new(EchoTool("lookup"))],
            vec![("mcp:search".into(), vec![Arc::new(EchoTool("lookup")) as Arc<dyn AgentTool>])],
        );
        assert_ne!(set.get("goto").expect("goto").description(), "echo");
        assert_eq!(set.names().iter().filter(|n| **n == "lookup").count(), 1);
        assert!(set.get(CLOSE_TOOL).is_some());
        assert_eq!(set.definitions().len(), set.len());
    }

    #[test]
    fn null_arguments_parse_as_empty_object() {
        #[derive(serde::Deserialize)]
        struct Empty {}
        assert!(parse_args::<Empty>("navback", &Value::Null).is_ok());
        let err = parse_args::<builtin::GotoArgs>("goto", &json!({})).err().unwrap();
        assert!(err.to_string().contains("goto"));
    }
}
