use std::ops::AddAssign;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use soulpilot_core_types::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolUse {
        call: ToolCall,
    },
    ToolResult {
        call_id: String,
        tool: String,
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn assistant(text: Option<String>, calls: &[ToolCall]) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            content.push(ContentPart::Text { text });
        }
        content.extend(
            calls
                .iter()
                .cloned()
                .map(|call| ContentPart::ToolUse { call }),
        );
        Self {
            role: ChatRole::Assistant,
            content,
        }
    }

    /// Tool results travel back to the model as a user turn.
    pub fn tool_results(results: &[ToolOutput]) -> Self {
        Self {
            role: ChatRole::User,
            content: results
                .iter()
                .map(|result| ContentPart::ToolResult {
                    call_id: result.call_id.clone(),
                    tool: result.tool.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                })
                .collect(),
        }
    }

    pub fn text(&self) -> Option<String> {
        let text = self
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Derives the input schema from an argument type.
    pub fn for_args<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ObjectSchema::of::<T>("args").schema)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(system: Option<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system,
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_messages(&self, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw.unwrap_or_default() {
            "end_turn" | "stop" | "" => StopReason::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => StopReason::ToolUse,
            "max_tokens" | "length" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// Token counts; providers that do not report a field leave it at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.reasoning_tokens += rhs.reasoning_tokens;
        self.cached_input_tokens += rhs.cached_input_tokens;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl ChatCompletion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    pub fn tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            text,
            tool_calls: calls,
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Result of executing one tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub tool: String,
    pub content: Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call: &ToolCall, content: Value) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool: call.tool.clone(),
            content,
            is_error: false,
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool: call.tool.clone(),
            content: serde_json::json!({ "error": message.into() }),
            is_error: true,
        }
    }
}

/// One finished step of a tool loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub step: u32,
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolOutput>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
    pub inference_ms: u64,
}

impl StepEvent {
    pub fn called(&self, tool: &str) -> bool {
        self.tool_calls.iter().any(|call| call.tool == tool)
    }
}

/// JSON schema used for structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub schema: Value,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Derives the schema of `T` with every subschema inlined; providers reject `$ref`.
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = SchemaSettings::draft07()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<T>();
        let schema = serde_json::to_value(root).unwrap_or(Value::Null);
        Self::new(name, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema, Deserialize)]
    #[allow(dead_code)]
    struct Headline {
        title: String,
        score: Option<u32>,
    }

    #[test]
    fn derived_schema_lists_required_fields() {
        let schema = ObjectSchema::of::<Headline>("headline");
        assert_eq!(schema.schema["required"], json!(["title"]));
    }

    #[test]
    fn assistant_message_skips_blank_text() {
        let call = ToolCall::new("c1", "close", json!({}));
        let message = ChatMessage::assistant(Some("  ".into()), &[call]);
        assert_eq!(message.content.len(), 1);
        assert!(message.text().is_none());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            reasoning_tokens: 2,
            cached_input_tokens: 0,
        };
        total += TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
            reasoning_tokens: 0,
            cached_input_tokens: 4,
        };
        assert_eq!(total.total(), 17);
        assert_eq!(total.reasoning_tokens, 2);
        assert_eq!(total.cached_input_tokens, 4);
    }

    #[test]
    fn stop_reasons_normalize_provider_spellings() {
        assert_eq!(StopReason::from_provider(Some("tool_calls")), StopReason::ToolUse);
        assert_eq!(StopReason::from_provider(Some("length")), StopReason::MaxTokens);
        assert_eq!(StopReason::from_provider(None), StopReason::EndTurn);
    }
}
