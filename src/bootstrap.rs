use std::sync::Arc;

use tracing::info;

use agent_core::{AgentCache, InstanceRegistry, Orchestrator};
use soulpilot_cache_store::FsCacheStorage;

use crate::config::Config;
use crate::providers::ConfigLlmResolver;

/// Builds an orchestrator from configuration. The host still has to set a page.
pub fn build_orchestrator(config: &Config) -> Orchestrator {
    let resolver = Arc::new(ConfigLlmResolver::new(config));
    let mut builder = Orchestrator::builder(resolver).options(config.orchestrator_options());
    if config.cache.enabled {
        let storage = Arc::new(FsCacheStorage::new(config.storage_policy()));
        info!(root = %storage.root().display(), "agent cache enabled");
        builder = builder.cache(Arc::new(AgentCache::new(storage)));
    }
    builder.build()
}

/// Builds an orchestrator and registers it for coordinated shutdown.
pub fn build_registered(config: &Config, registry: &InstanceRegistry) -> Orchestrator {
    let orchestrator = build_orchestrator(config);
    registry.register_instance(Arc::new(orchestrator.clone()));
    orchestrator
}
