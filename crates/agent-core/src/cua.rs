//! Computer-use (pixel/coordinate) backend seam.
//!
//! The backend's own tools and loop live with the host. The orchestrator
//! only routes to it and wraps it in the same replay cache as the tool loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::RecordingSession;
use crate::model::AgentResult;
use crate::options::{PauseCheck, StepCallback};
use crate::page::PageHandle;
use crate::tools::AgentTool;

pub struct CuaRun {
    pub instruction: String,
    pub model: String,
    pub max_steps: u32,
    pub page: PageHandle,
    pub on_step: Option<StepCallback>,
    pub check_pause_state: Option<PauseCheck>,
    /// Record replay steps here when set; tool names must match [`ComputerUseBackend::replay_tools`].
    pub recorder: Option<RecordingSession>,
}

#[async_trait]
pub trait ComputerUseBackend: Send + Sync {
    fn supports_model(&self, model: &str) -> bool;

    /// Tools used to replay recorded computer-use steps.
    fn replay_tools(&self) -> Vec<Arc<dyn AgentTool>> {
        Vec::new()
    }

    /// Same failure contract as the tool loop: errors come back as a failed result.
    async fn run(&self, run: CuaRun) -> AgentResult;
}
