use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::agent_loop::BackendKind;
use crate::options::{AgentConfig, AgentExecuteOptions};
use crate::tools::ToolSet;

/// Instructions mentioning any of these depend on when they run.
pub const VOLATILE_MARKERS: &[&str] = &["random", "today", "right now", "current time", "latest"];

/// Cheap eligibility check run before any hashing.
pub fn should_attempt_cache(instruction: &str) -> bool {
    let normalized = instruction.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    !VOLATILE_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
}

/// Collapses whitespace runs; case is kept because it can matter to the task.
pub fn normalize_instruction(instruction: &str) -> String {
    instruction.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Execution options with callbacks and page handles removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedOptions {
    pub max_steps: u32,
}

impl From<&AgentExecuteOptions> for SanitizedOptions {
    fn from(options: &AgentExecuteOptions) -> Self {
        Self {
            max_steps: options.max_steps,
        }
    }
}

/// Hash of everything in `config` that changes observable agent behaviour.
///
/// `model` and `execution_model` are the resolved model names, so a default
/// model change invalidates entries recorded under the old default.
pub fn build_config_signature(
    config: &AgentConfig,
    model: &str,
    execution_model: &str,
    backend: BackendKind,
) -> String {
    let mut tools: Vec<Value> = config
        .tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "schema": tool.input_schema(),
            })
        })
        .collect();
    tools.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    let mut integrations: Vec<&str> = config.integrations.iter().map(|p| p.id()).collect();
    integrations.sort_unstable();

    sha256_hex(&json!({
        "model": model,
        "execution_model": execution_model,
        "system_prompt": config.system_prompt,
        "tools": tools,
        "integrations": integrations,
        "cua": config.cua,
        "backend": backend,
    }))
}

/// Folds the tools a run will actually offer into `signature`, so an
/// integration whose listing changes under the same id stops matching.
pub fn signature_with_tools(signature: &str, tools: &ToolSet) -> String {
    let mut definitions = tools.definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    sha256_hex(&json!({
        "config": signature,
        "tools": definitions,
    }))
}

pub fn compute_fingerprint(
    instruction: &str,
    options: &SanitizedOptions,
    config_signature: &str,
    start_url: &str,
) -> String {
    sha256_hex(&json!({
        "instruction": normalize_instruction(instruction),
        "options": options,
        "config": config_signature,
        "start_url": start_url.trim(),
    }))
}

/// serde_json objects keep sorted keys, so the serialized form is canonical.
fn sha256_hex(value: &Value) -> String {
    let canonical = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_or_empty_instructions_are_not_cached() {
        assert!(should_attempt_cache("Open example.com and close"));
        assert!(!should_attempt_cache("   "));
        assert!(!should_attempt_cache("Find the LATEST release notes"));
        assert!(!should_attempt_cache("pick a random article"));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let options = SanitizedOptions { max_steps: 20 };
        let a = compute_fingerprint("open  example.com", &options, "sig", "about:blank");
        let b = compute_fingerprint("open example.com ", &options, "sig", "about:blank");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, compute_fingerprint("open example.org", &options, "sig", "about:blank"));
        assert_ne!(
            a,
            compute_fingerprint("open example.com", &options, "sig", "https://other.test")
        );
        assert_ne!(
            a,
            compute_fingerprint(
                "open example.com",
                &SanitizedOptions { max_steps: 5 },
                "sig",
                "about:blank"
            )
        );
    }

    #[test]
    fn signature_tracks_listed_tool_definitions() {
        use std::sync::Arc;

        use async_trait::async_trait;

        use crate::tools::{AgentTool, ToolContext, ToolError};

        struct Lookup(&'static str);

        #[async_trait]
        impl AgentTool for Lookup {
            fn name(&self) -> &str {
                "lookup"
            }

            fn description(&self) -> &str {
                self.0
            }

            fn input_schema(&self) -> Value {
                json!({ "type": "object" })
            }

            async fn execute(&self, _ctx: &ToolContext, _arguments: &Value) -> Result<Value, ToolError> {
                Ok(Value::Null)
            }
        }

        let listed = |description: &'static str| {
            let tools: Vec<Arc<dyn AgentTool>> = vec![Arc::new(Lookup(description))];
            ToolSet::assemble(&[], vec![("crm".to_string(), tools)])
        };
        let v1 = signature_with_tools("sig", &listed("Find a customer"));
        assert_eq!(v1, signature_with_tools("sig", &listed("Find a customer")));
        assert_ne!(v1, signature_with_tools("sig", &listed("Find a customer by email")));
        assert_ne!(v1, signature_with_tools("sig", &ToolSet::builtin()));
        assert_ne!(v1, signature_with_tools("other", &listed("Find a customer")));
    }

    #[test]
    fn signature_tracks_model_prompt_and_backend() {
        let config = AgentConfig::new();
        let base = build_config_signature(&config, "m1", "m1", BackendKind::SdkToolCalling);
        assert_eq!(
            base,
            build_config_signature(&config, "m1", "m1", BackendKind::SdkToolCalling)
        );
        assert_ne!(
            base,
            build_config_signature(&config, "m2", "m1", BackendKind::SdkToolCalling)
        );
        assert_ne!(
            base,
            build_config_signature(&config, "m1", "m1", BackendKind::DirectRest)
        );
        let prompted = AgentConfig::new().system_prompt("be terse");
        assert_ne!(
            base,
            build_config_signature(&prompted, "m1", "m1", BackendKind::SdkToolCalling)
        );
        let cua = AgentConfig::new().cua(true);
        assert_ne!(
            base,
            build_config_signature(&cua, "m1", "m1", BackendKind::SdkToolCalling)
        );
    }
}
