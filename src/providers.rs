//! Model resolution from host configuration.

use std::sync::Arc;

use tracing::debug;

use agent_core::{LlmResolver, RestEndpoint};
use soulpilot_llm::{
    AnthropicAuth, AnthropicClient, AnthropicConfig, LlmClient, LlmError, OpenAiClient,
    OpenAiConfig, ReqwestTransport,
};

use crate::config::{Config, ProviderConfig, ProvidersConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn from_str_case(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Guesses the provider from a bare model name.
    fn infer(model: &str) -> Option<Self> {
        let lowered = model.to_ascii_lowercase();
        if lowered.starts_with("claude") {
            Some(Self::Anthropic)
        } else if lowered.starts_with("gpt")
            || lowered.starts_with("o1")
            || lowered.starts_with("o3")
            || lowered.starts_with("o4")
            || lowered.starts_with("computer-use")
        {
            Some(Self::OpenAi)
        } else {
            None
        }
    }
}

/// A parsed model selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelector {
    pub provider: ProviderKind,
    pub model: Option<String>,
}

/// Resolves selectors against the configured providers.
pub struct ConfigLlmResolver {
    default_model: String,
    providers: ProvidersConfig,
}

impl ConfigLlmResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            default_model: config.model.clone(),
            providers: config.providers.clone(),
        }
    }

    /// `provider/model`, `provider`, or a bare model name.
    pub fn parse_selector(&self, selector: &str) -> Result<ModelSelector, LlmError> {
        let selector = selector.trim();
        if let Some((provider, model)) = selector.split_once('/') {
            let provider = ProviderKind::from_str_case(provider).ok_or_else(|| {
                LlmError::configuration(format!("unknown provider in model selector '{selector}'"))
            })?;
            let model = model.trim();
            return Ok(ModelSelector {
                provider,
                model: (!model.is_empty()).then(|| model.to_string()),
            });
        }
        if let Some(provider) = ProviderKind::from_str_case(selector) {
            return Ok(ModelSelector {
                provider,
                model: None,
            });
        }
        let provider = ProviderKind::infer(selector)
            .or_else(|| self.only_configured_provider())
            .ok_or_else(|| {
                LlmError::configuration(format!(
                    "cannot tell which provider serves '{selector}'; use provider/model"
                ))
            })?;
        Ok(ModelSelector {
            provider,
            model: Some(selector.to_string()),
        })
    }

    fn only_configured_provider(&self) -> Option<ProviderKind> {
        match (&self.providers.openai, &self.providers.anthropic) {
            (Some(_), None) => Some(ProviderKind::OpenAi),
            (None, Some(_)) => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    fn selector(&self, selector: Option<&str>) -> Result<ModelSelector, LlmError> {
        self.parse_selector(selector.unwrap_or(&self.default_model))
    }

    fn provider_config(&self, kind: ProviderKind) -> Result<&ProviderConfig, LlmError> {
        let config = match kind {
            ProviderKind::OpenAi => self.providers.openai.as_ref(),
            ProviderKind::Anthropic => self.providers.anthropic.as_ref(),
        };
        config.ok_or_else(|| {
            LlmError::configuration(format!("provider '{}' is not configured", kind.label()))
        })
    }

    fn anthropic_config(
        &self,
        selector: &ModelSelector,
        auth: AnthropicAuth,
    ) -> Result<AnthropicConfig, LlmError> {
        let provider = self.provider_config(ProviderKind::Anthropic)?;
        let model = selector
            .model
            .clone()
            .or_else(|| provider.model.clone())
            .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string());
        let mut config = AnthropicConfig::new(auth, model);
        if let Some(base) = provider.api_base.clone() {
            config.api_base = base;
        }
        if let Some(temperature) = provider.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = provider.max_output_tokens {
            config.max_tokens = max_tokens;
        }
        config.timeout = provider.timeout();
        Ok(config)
    }
}

impl LlmResolver for ConfigLlmResolver {
    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn resolve(&self, selector: Option<&str>) -> Result<Arc<dyn LlmClient>, LlmError> {
        let parsed = self.selector(selector)?;
        let provider = self.provider_config(parsed.provider)?;
        debug!(provider = parsed.provider.label(), model = ?parsed.model, "resolving model");
        match parsed.provider {
            ProviderKind::OpenAi => {
                let mut keys: Vec<String> = provider.api_key.iter().cloned().collect();
                keys.extend(provider.api_keys.iter().cloned());
                let model = parsed
                    .model
                    .clone()
                    .or_else(|| provider.model.clone())
                    .unwrap_or_else(|| "gpt-4o".to_string());
                let mut config = OpenAiConfig::new(keys, model);
                if let Some(base) = provider.api_base.clone() {
                    config.api_base = base;
                }
                if let Some(temperature) = provider.temperature {
                    config.temperature = temperature;
                }
                config.timeout = provider.timeout();
                Ok(Arc::new(OpenAiClient::new(config)?))
            }
            ProviderKind::Anthropic => {
                let auth = match (&provider.api_key, &provider.oauth_token) {
                    (Some(key), _) if !key.trim().is_empty() => AnthropicAuth::ApiKey(key.clone()),
                    (_, Some(token)) => AnthropicAuth::OAuth {
                        access_token: token.clone(),
                    },
                    _ => {
                        return Err(LlmError::configuration(
                            "anthropic needs api_key or oauth_token (ANTHROPIC_API_KEY / ANTHROPIC_OAUTH_TOKEN)",
                        ))
                    }
                };
                let config = self.anthropic_config(&parsed, auth)?;
                Ok(Arc::new(AnthropicClient::new(config)?))
            }
        }
    }

    /// Only Anthropic OAuth tokens get a direct messages endpoint.
    fn resolve_rest(&self, selector: Option<&str>) -> Result<Option<RestEndpoint>, LlmError> {
        let parsed = self.selector(selector)?;
        if parsed.provider != ProviderKind::Anthropic {
            return Ok(None);
        }
        let provider = self.provider_config(ProviderKind::Anthropic)?;
        let Some(token) = provider
            .oauth_token
            .as_ref()
            .filter(|token| !token.trim().is_empty())
        else {
            return Ok(None);
        };
        let config = self.anthropic_config(
            &parsed,
            AnthropicAuth::OAuth {
                access_token: token.clone(),
            },
        )?;
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Some(RestEndpoint {
            config,
            transport: Arc::new(transport),
        }))
    }
}
