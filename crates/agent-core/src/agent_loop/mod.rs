//! Agent execution loop.
//!
//! A run moves through `PREPARING → RUNNING(n) → {RUNNING(n+1) | COMPLETED |
//! STOPPED | FAILED}`. Each step asks the model for tool calls and executes
//! them in order against the live page.
//!
//! # Architecture
//!
//! ```text
//! controller ── prepares prompt + tools, builds the result
//!     │
//!     ▼
//! AgentBackend::drive ── SdkToolCalling (client tool loop) | DirectRest (manual loop)
//!     │
//!     ▼
//! StepProcessor ── state mutation, step updates, recording (shared by both)
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod processor;
pub mod prompt;
pub mod rest;
pub mod sdk;
pub mod stream;

pub use backend::{closes_run, AgentBackend, BackendKind};
pub use config::{AgentLoopConfig, RetryPolicy};
pub use controller::{AgentLoopController, AgentRun};
pub use processor::{StepObserver, StepProcessor};
pub use prompt::{build_system_prompt, COMPLETION_DIRECTIVE};
pub use rest::{DirectRestBackend, RestEndpoint};
pub use sdk::SdkToolCallingBackend;
pub use stream::{spawn_run, AgentExecution, AgentStreamEvent, AgentStreamResult, EventSender};
