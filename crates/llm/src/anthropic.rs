use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use soulpilot_core_types::ToolCall;

use crate::client::LlmClient;
use crate::errors::LlmError;
use crate::rest::{ReqwestTransport, RestTransport};
use crate::types::{
    ChatCompletion, ChatMessage, ChatRequest, ChatRole, ContentPart, StopReason, TokenUsage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";

#[derive(Debug, Clone)]
pub enum AnthropicAuth {
    ApiKey(String),
    /// Bearer access token obtained through an OAuth flow.
    OAuth { access_token: String },
}

impl AnthropicAuth {
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![(
            "anthropic-version".to_string(),
            ANTHROPIC_VERSION.to_string(),
        )];
        match self {
            AnthropicAuth::ApiKey(key) => headers.push(("x-api-key".to_string(), key.clone())),
            AnthropicAuth::OAuth { access_token } => {
                headers.push(("authorization".to_string(), format!("Bearer {access_token}")));
                headers.push(("anthropic-beta".to_string(), OAUTH_BETA.to_string()));
            }
        }
        headers
    }

    fn is_empty(&self) -> bool {
        match self {
            AnthropicAuth::ApiKey(key) => key.trim().is_empty(),
            AnthropicAuth::OAuth { access_token } => access_token.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub auth: AnthropicAuth,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(auth: AnthropicAuth, model: impl Into<String>) -> Self {
        Self {
            auth,
            model: model.into(),
            api_base: "https://api.anthropic.com/v1".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn messages_url(&self) -> String {
        format!("{}/messages", self.api_base.trim_end_matches('/'))
    }
}

pub struct AnthropicClient {
    transport: Arc<dyn RestTransport>,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(
        config: AnthropicConfig,
        transport: Arc<dyn RestTransport>,
    ) -> Result<Self, LlmError> {
        if config.auth.is_empty() {
            return Err(LlmError::configuration(
                "missing Anthropic credentials (API key or OAuth token)",
            ));
        }
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn create_chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, LlmError> {
        let body = build_messages_body(&self.config, request);
        let response = self
            .transport
            .post_json(&self.config.messages_url(), &self.config.auth.headers(), &body)
            .await?;
        parse_messages_response(&response)
    }
}

/// Serializes a request into the Messages API shape.
pub fn build_messages_body(config: &AnthropicConfig, request: &ChatRequest) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message_to_wire).collect();
    let mut body = json!({
        "model": config.model,
        "max_tokens": request.max_tokens.unwrap_or(config.max_tokens),
        "temperature": request.temperature.unwrap_or(config.temperature),
        "messages": messages,
    });
    if let Some(system) = request.system.as_deref() {
        body["system"] = Value::String(system.to_string());
    }
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect(),
        );
    }
    body
}

fn message_to_wire(message: &ChatMessage) -> Value {
    let role = match message.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    let content: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::ToolUse { call } => json!({
                "type": "tool_use",
                "id": call.call_id,
                "name": call.tool,
                "input": if call.arguments.is_null() { json!({}) } else { call.arguments.clone() },
            }),
            ContentPart::ToolResult {
                call_id,
                content,
                is_error,
                ..
            } => json!({
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": match content {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
                "is_error": is_error,
            }),
        })
        .collect();
    json!({ "role": role, "content": content })
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

/// Parses a Messages API response; thinking blocks count as reasoning text.
pub fn parse_messages_response(raw: &Value) -> Result<ChatCompletion, LlmError> {
    let response: MessagesResponse = serde_json::from_value(raw.clone())
        .map_err(|err| LlmError::malformed(format!("claude response invalid: {err}")))?;

    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::Text { text } => texts.push(text),
            ResponseBlock::Thinking { thinking } if !thinking.trim().is_empty() => {
                texts.push(thinking)
            }
            ResponseBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input))
            }
            _ => {}
        }
    }

    let usage = response
        .usage
        .map(|usage| TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            reasoning_tokens: 0,
            cached_input_tokens: usage.cache_read_input_tokens,
        })
        .unwrap_or_default();
    let text = texts.join("\n");

    Ok(ChatCompletion {
        text: if text.trim().is_empty() { None } else { Some(text) },
        tool_calls,
        stop_reason: StopReason::from_provider(response.stop_reason.as_deref()),
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolDefinition, ToolOutput};

    fn config() -> AnthropicConfig {
        AnthropicConfig::new(
            AnthropicAuth::OAuth {
                access_token: "tok".into(),
            },
            "claude-sonnet-4",
        )
    }

    #[test]
    fn oauth_headers_use_bearer_token() {
        let headers = config().auth.headers();
        assert!(headers
            .iter()
            .any(|(k, v)| k == "authorization" && v == "Bearer tok"));
        assert!(headers.iter().any(|(k, _)| k == "anthropic-beta"));
    }

    #[test]
    fn body_carries_tools_and_tool_results() {
        let call = ToolCall::new("toolu_1", "goto", json!({"url": "https://example.com"}));
        let request = ChatRequest::new(
            Some("system".into()),
            vec![
                ChatMessage::user("open example.com"),
                ChatMessage::assistant(None, &[call.clone()]),
                ChatMessage::tool_results(&[ToolOutput::ok(&call, json!({"ok": true}))]),
            ],
        )
        .with_tools(vec![ToolDefinition::new("goto", "Navigate", json!({"type": "object"}))]);

        let body = build_messages_body(&config(), &request);
        assert_eq!(body["system"], "system");
        assert_eq!(body["tools"][0]["name"], "goto");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(body["messages"][2]["content"][0]["content"], "{\"ok\":true}");
    }

    #[test]
    fn parses_tool_use_and_usage() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Opening the page"},
                {"type": "tool_use", "id": "toolu_9", "name": "goto", "input": {"url": "https://example.com"}},
                {"type": "server_tool_use", "id": "x"}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7, "cache_read_input_tokens": 3}
        });
        let completion = parse_messages_response(&raw).expect("parse");
        assert_eq!(completion.text.as_deref(), Some("Opening the page"));
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].tool, "goto");
        assert_eq!(completion.stop_reason, StopReason::ToolUse);
        assert_eq!(completion.usage.cached_input_tokens, 3);
        assert_eq!(completion.usage.reasoning_tokens, 0);
    }

    #[test]
    fn missing_credentials_are_a_configuration_error() {
        let mut cfg = config();
        cfg.auth = AnthropicAuth::ApiKey(String::new());
        let err = AnthropicClient::new(cfg).err().expect("missing key");
        assert!(err.is_configuration());
    }
}
