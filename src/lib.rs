//! SoulPilot host library
//!
//! Configuration, model resolution, logging setup and cache maintenance
//! around the `agent-core` orchestrator.

pub mod bootstrap;
pub mod cache_admin;
pub mod config;
pub mod providers;
pub mod telemetry;

pub use bootstrap::{build_orchestrator, build_registered};
pub use cache_admin::{CacheAdmin, EntrySummary};
pub use config::{Config, LoadedConfig};
pub use providers::ConfigLlmResolver;
