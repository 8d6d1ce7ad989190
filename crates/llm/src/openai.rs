use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use soulpilot_core_types::ToolCall;

use crate::client::LlmClient;
use crate::errors::LlmError;
use crate::json::extract_json_object;
use crate::rest::{ReqwestTransport, RestTransport};
use crate::types::{ChatCompletion, ChatRequest, ChatRole, ContentPart, StopReason, TokenUsage};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_keys: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            api_keys,
            model: model.into(),
            api_base: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct OpenAiClient {
    transport: Arc<dyn RestTransport>,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(
        mut config: OpenAiConfig,
        transport: Arc<dyn RestTransport>,
    ) -> Result<Self, LlmError> {
        config.api_keys.retain(|key| !key.trim().is_empty());
        if config.api_keys.is_empty() {
            return Err(LlmError::configuration("missing OpenAI API key"));
        }
        Ok(Self { transport, config })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn create_chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = build_chat_body(&self.config, request);

        let mut last_error: Option<LlmError> = None;
        for (index, key) in self.config.api_keys.iter().enumerate() {
            let headers = vec![("authorization".to_string(), format!("Bearer {key}"))];
            match self.transport.post_json(&url, &headers, &body).await {
                Ok(raw) => return parse_chat_response(&raw),
                Err(LlmError::Provider {
                    message,
                    status: Some(429),
                    ..
                }) if index + 1 < self.config.api_keys.len() => {
                    let friendly = openai_rate_limit_message(&message);
                    warn!(
                        target: "openai",
                        message = %friendly,
                        raw = %message,
                        attempt = index + 1,
                        remaining = self.config.api_keys.len() - index - 1,
                        "OpenAI rate limited request; switching API key"
                    );
                    last_error = Some(LlmError::provider(friendly, Some(429)));
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::provider("OpenAI request exhausted all API keys", None)))
    }
}

fn build_chat_body(config: &OpenAiConfig, request: &ChatRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = request.system.as_deref() {
        messages.push(json!({"role": "system", "content": system}));
    }
    for message in &request.messages {
        let mut texts = Vec::new();
        let mut calls = Vec::new();
        for part in &message.content {
            match part {
                ContentPart::Text { text } => texts.push(text.clone()),
                ContentPart::ToolUse { call } => calls.push(json!({
                    "id": call.call_id,
                    "type": "function",
                    "function": {
                        "name": call.tool,
                        "arguments": call.arguments.to_string(),
                    },
                })),
                ContentPart::ToolResult {
                    call_id, content, ..
                } => messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": match content {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    },
                })),
            }
        }
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        if texts.is_empty() && calls.is_empty() {
            continue;
        }
        let mut wire = json!({"role": role});
        wire["content"] = if texts.is_empty() {
            Value::Null
        } else {
            Value::String(texts.join("\n"))
        };
        if !calls.is_empty() {
            wire["tool_calls"] = Value::Array(calls);
        }
        messages.push(wire);
    }

    let mut body = json!({
        "model": config.model,
        "temperature": request.temperature.unwrap_or(config.temperature),
        "messages": messages,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.input_schema,
                        },
                    })
                })
                .collect(),
        );
    }
    body
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokenDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokenDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokenDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct CompletionTokenDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

fn parse_chat_response(raw: &Value) -> Result<ChatCompletion, LlmError> {
    let response: ChatCompletionResponse = serde_json::from_value(raw.clone())
        .map_err(|err| LlmError::malformed(format!("openai response invalid: {err}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::malformed("openai response missing choices"))?;

    let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
    for call in choice.message.tool_calls {
        let arguments = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|err| {
                LlmError::malformed(format!(
                    "arguments for tool '{}' are not JSON: {err}",
                    call.function.name
                ))
            })?
        };
        tool_calls.push(ToolCall::new(call.id, call.function.name, arguments));
    }

    let usage = response
        .usage
        .map(|usage| TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            reasoning_tokens: usage
                .completion_tokens_details
                .map(|details| details.reasoning_tokens)
                .unwrap_or_default(),
            cached_input_tokens: usage
                .prompt_tokens_details
                .map(|details| details.cached_tokens)
                .unwrap_or_default(),
        })
        .unwrap_or_default();

    Ok(ChatCompletion {
        text: choice.message.content.filter(|text| !text.trim().is_empty()),
        tool_calls,
        stop_reason: StopReason::from_provider(choice.finish_reason.as_deref()),
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorMessage {
    message: Option<String>,
}

fn openai_rate_limit_message(raw: &str) -> String {
    let envelope = extract_json_object(raw)
        .and_then(|json| serde_json::from_str::<OpenAiErrorEnvelope>(&json).ok());
    if let Some(message) = envelope.and_then(|envelope| envelope.error.message) {
        return format!(
            "OpenAI rate limit exceeded: {}. Please retry later or configure a higher tier.",
            message.trim()
        );
    }
    "OpenAI rate limit exceeded; please retry later or reduce usage.".to_string()
}
