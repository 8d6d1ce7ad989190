//! Explicit registry of live orchestrator instances.
//!
//! The host owns one of these and decides when to call [`InstanceRegistry::shutdown_all`]
//! (signal handler, test teardown). Nothing in this crate installs process hooks.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use soulpilot_core_types::InstanceId;

#[async_trait]
pub trait ManagedInstance: Send + Sync {
    fn instance_id(&self) -> InstanceId;

    async fn shutdown(&self);
}

#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<InstanceId, Arc<dyn ManagedInstance>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if an instance with the same id was already registered.
    pub fn register_instance(&self, instance: Arc<dyn ManagedInstance>) -> bool {
        let id = instance.instance_id();
        let fresh = self.instances.insert(id.clone(), instance).is_none();
        debug!(instance = %id, fresh, "instance registered");
        fresh
    }

    pub fn unregister_instance(&self, id: &InstanceId) -> bool {
        self.instances.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Shuts every registered instance down and empties the registry.
    pub async fn shutdown_all(&self) -> usize {
        let ids: Vec<InstanceId> = self.instances.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if let Some((_, instance)) = self.instances.remove(&id) {
                instance.shutdown().await;
                closed += 1;
            }
        }
        info!(closed, "all registered instances shut down");
        closed
    }
}
