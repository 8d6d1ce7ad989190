//! Host configuration.
//!
//! Loaded from YAML, then overridden from the environment. Every section has
//! defaults so an empty (or missing) file is a valid configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use agent_core::{BackendKind, OrchestratorOptions, RetryPolicy, DEFAULT_MAX_STEPS};
use soulpilot_cache_store::StoragePolicy;

const LOCAL_CONFIG: &str = "config/soulpilot.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model selector used when an agent names none: `provider/model` or a bare model name.
    pub model: String,
    pub providers: ProvidersConfig,
    pub agent: AgentSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o".to_string(),
            providers: ProvidersConfig::default(),
            agent: AgentSettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Extra keys rotated through on rate limits (OpenAI).
    pub api_keys: Vec<String>,
    /// Bearer token for the messages endpoint (Anthropic).
    pub oauth_token: Option<String>,
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(120))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_steps: u32,
    /// Force a backend instead of picking one from the resolved credentials.
    pub backend: Option<BackendKind>,
    pub rest_retry: RetryPolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            backend: None,
            rest_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Defaults to `<cache dir>/soulpilot/agent-cache`.
    pub dir: Option<PathBuf>,
    pub namespace: String,
    pub max_entry_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let policy = StoragePolicy::default();
        Self {
            enabled: true,
            dir: None,
            namespace: "agent".to_string(),
            max_entry_bytes: policy.max_entry_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub from_file: bool,
}

impl Config {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Priority: explicit path > ./config/soulpilot.yaml > <config dir>/soulpilot/config.yaml.
    /// A missing file yields defaults. Environment overrides are applied last.
    pub async fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        let (mut config, from_file) = if path.exists() {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = Self::from_yaml_str(&content)?;
            info!(path = %path.display(), "loaded configuration");
            (config, true)
        } else {
            if explicit.is_some() {
                warn!(path = %path.display(), "config file not found, using defaults");
            }
            (Self::default(), false)
        };

        config.apply_env_overrides();
        Ok(LoadedConfig {
            config,
            path,
            from_file,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Applies overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(model) = get("SOULPILOT_MODEL") {
            self.model = model;
        }
        if let Some(dir) = get("SOULPILOT_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = get("SOULPILOT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_key
                .get_or_insert(key);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.providers
                .anthropic
                .get_or_insert_with(ProviderConfig::default)
                .api_key
                .get_or_insert(key);
        }
        if let Some(token) = get("ANTHROPIC_OAUTH_TOKEN") {
            self.providers
                .anthropic
                .get_or_insert_with(ProviderConfig::default)
                .oauth_token
                .get_or_insert(token);
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("soulpilot").join("agent-cache"))
                .unwrap_or_else(|| PathBuf::from("./agent-cache"))
        })
    }

    pub fn storage_policy(&self) -> StoragePolicy {
        let mut policy =
            StoragePolicy::new(self.cache_dir()).with_namespace(self.cache.namespace.clone());
        policy.max_entry_bytes = self.cache.max_entry_bytes;
        policy
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            backend: self.agent.backend,
            rest_retry: self.agent.rest_retry,
        }
    }

    /// Copy safe to print: secrets replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for provider in [&mut copy.providers.openai, &mut copy.providers.anthropic]
            .into_iter()
            .flatten()
        {
            redact(&mut provider.api_key);
            redact(&mut provider.oauth_token);
            for key in &mut provider.api_keys {
                *key = REDACTED.to_string();
            }
        }
        copy
    }
}

const REDACTED: &str = "<redacted>";

fn redact(secret: &mut Option<String>) {
    if secret.is_some() {
        *secret = Some(REDACTED.to_string());
    }
}

fn default_config_path() -> PathBuf {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("soulpilot").join("config.yaml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_yaml_is_the_default_config() {
        let config = Config::from_yaml_str("  \n").expect("parse");
        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.agent.max_steps, 20);
        assert!(config.cache.enabled);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_yaml_str(
            "model: anthropic/claude-sonnet-4\nagent:\n  max_steps: 8\n  backend: direct_rest\n",
        )
        .expect("parse");
        assert_eq!(config.model, "anthropic/claude-sonnet-4");
        assert_eq!(config.agent.max_steps, 8);
        assert_eq!(config.agent.backend, Some(BackendKind::DirectRest));
        assert_eq!(config.agent.rest_retry, RetryPolicy::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn env_overrides_fill_missing_credentials_only() {
        let mut config = Config::from_yaml_str(
            "providers:\n  openai:\n    api_key: sk-from-file\n",
        )
        .expect("parse");
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-from-env"),
            ("ANTHROPIC_OAUTH_TOKEN", "oauth-env"),
            ("SOULPILOT_MODEL", "  "),
            ("SOULPILOT_CACHE_DIR", "/tmp/pilot-cache"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        let openai = config.providers.openai.as_ref().expect("openai");
        assert_eq!(openai.api_key.as_deref(), Some("sk-from-file"));
        let anthropic = config.providers.anthropic.as_ref().expect("anthropic");
        assert_eq!(anthropic.oauth_token.as_deref(), Some("oauth-env"));
        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/pilot-cache"));
    }

    #[test]
    fn storage_policy_uses_namespace_and_limit() {
        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/var/cache/pilot"));
        config.cache.namespace = "team a".to_string();
        config.cache.max_entry_bytes = 1024;
        let policy = config.storage_policy();
        assert_eq!(policy.namespace_root(), PathBuf::from("/var/cache/pilot/team-a"));
        assert_eq!(policy.max_entry_bytes, 1024);
    }

    #[test]
    fn redaction_hides_every_secret() {
        let mut config = Config::default();
        config.providers.openai = Some(ProviderConfig {
            api_key: Some("sk-1".into()),
            api_keys: vec!["sk-2".into()],
            ..ProviderConfig::default()
        });
        let yaml = serde_yaml::to_string(&config.redacted()).expect("yaml");
        assert!(!yaml.contains("sk-1"));
        assert!(!yaml.contains("sk-2"));
    }
}
