//! LLM capability layer.
//!
//! Every provider is exposed through [`LlmClient`]: a single tool-calling
//! completion, an iterate-until-stop tool loop built on top of it, and
//! schema-checked structured output.

pub mod anthropic;
pub mod client;
pub mod errors;
pub mod json;
pub mod openai;
pub mod rest;
pub mod scripted;
pub mod types;

pub use anthropic::{AnthropicAuth, AnthropicClient, AnthropicConfig};
pub use client::{
    HookAbort, LlmClient, StopPredicate, StructuredOutputPolicy, ToolLoopHooks, ToolLoopOutcome,
};
pub use errors::LlmError;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use rest::{ReqwestTransport, RestTransport};
pub use scripted::ScriptedLlmClient;
pub use types::{
    ChatCompletion, ChatMessage, ChatRequest, ChatRole, ContentPart, ObjectSchema, StepEvent,
    StopReason, TokenUsage, ToolDefinition, ToolOutput,
};
