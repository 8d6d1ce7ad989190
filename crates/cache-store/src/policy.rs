use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoragePolicy {
    /// Directory under which every namespace lives. Created on first write.
    pub root: PathBuf,
    /// Sub-directory separating unrelated caches sharing one root.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Largest blob accepted by `put`.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,
    #[serde(default)]
    pub read_only: bool,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_max_entry_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./agent-cache"),
            namespace: default_namespace(),
            max_entry_bytes: default_max_entry_bytes(),
            read_only: false,
        }
    }
}

impl StoragePolicy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = sanitize_component(&namespace.into());
        self
    }

    pub fn namespace_root(&self) -> PathBuf {
        self.root.join(sanitize_component(&self.namespace))
    }
}

pub(crate) fn sanitize_component(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return default_namespace();
    }
    trimmed
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' => ch,
            '-' | '_' => ch,
            _ => '-',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_sanitized() {
        let policy = StoragePolicy::new("/tmp/cache").with_namespace("agent/v1 cache");
        assert_eq!(policy.namespace, "agent-v1-cache");
        assert_eq!(
            policy.namespace_root(),
            PathBuf::from("/tmp/cache/agent-v1-cache")
        );
    }

    #[test]
    fn blank_namespace_falls_back_to_default() {
        let policy = StoragePolicy::new("/tmp/cache").with_namespace("   ");
        assert_eq!(policy.namespace, "default");
    }
}
