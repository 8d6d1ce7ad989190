//! Agent core: the step loop that drives a page through model tool calls,
//! the replay cache in front of it, and the orchestrator that wires both.
//!
//! ```text
//! Orchestrator::agent(config) ── AgentHandle::execute(options)
//!     │
//!     ├─ AgentCache: fingerprint → replay hit, or record a live run
//!     └─ AgentLoopController → AgentBackend (SDK tool calling | direct REST)
//! ```

pub mod agent_loop;
pub mod cache;
pub mod cua;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod options;
pub mod orchestrator;
pub mod page;
pub mod registry;
pub mod test_support;
pub mod tools;

pub use agent_loop::{
    AgentBackend, AgentExecution, AgentLoopConfig, AgentLoopController, AgentStreamEvent,
    AgentStreamResult,
    BackendKind, DirectRestBackend, RestEndpoint, RetryPolicy, SdkToolCallingBackend,
};
pub use cache::{AgentCache, CacheContext, CachedAgentEntry, RecordingSession};
pub use cua::{ComputerUseBackend, CuaRun};
pub use errors::AgentError;
pub use model::{AgentAction, AgentResult, AgentState, AgentStepUpdate, AgentUsage};
pub use options::{AgentConfig, AgentExecuteOptions, PauseCheck, StepCallback, DEFAULT_MAX_STEPS};
pub use orchestrator::{
    AgentHandle, LlmResolver, Orchestrator, OrchestratorBuilder, OrchestratorOptions,
    StaticLlmResolver,
};
pub use page::{AgentPage, PageError, PageHandle, ScrollDirection};
pub use registry::{InstanceRegistry, ManagedInstance};
pub use tools::{AgentTool, ToolContext, ToolError, ToolProvider, ToolSet};
