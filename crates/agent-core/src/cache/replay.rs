use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::AgentError;
use crate::model::{AgentAction, AgentResult};
use crate::tools::{ToolContext, ToolSet, CLOSE_TOOL};

use super::fingerprint::SanitizedOptions;

pub const ENTRY_VERSION: u32 = 1;

/// One externally observable tool invocation of a recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReplayStep {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    /// Actions the invocation produced, in order.
    #[serde(default)]
    pub actions: Vec<AgentAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Serialized form of a cache entry: the replay script plus the outcome it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAgentEntry {
    pub version: u32,
    pub fingerprint: String,
    pub instruction: String,
    pub start_url: String,
    pub options: SanitizedOptions,
    pub steps: Vec<AgentReplayStep>,
    pub result: AgentResult,
    pub created_at: DateTime<Utc>,
}

/// Re-executes `steps` against the current page and returns freshly stamped actions.
///
/// Read-only tools are not re-run; their recorded actions are reused as-is, so
/// replay never calls a model. Any failure aborts the whole replay.
pub async fn replay_steps(
    steps: &[AgentReplayStep],
    tools: &ToolSet,
    ctx: &ToolContext,
) -> Result<Vec<AgentAction>, AgentError> {
    let mut actions = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        if step.tool != CLOSE_TOOL {
            let tool = tools.get(&step.tool).ok_or_else(|| {
                AgentError::tool(&step.tool, "tool is not available for replay")
            })?;
            if tool.replays() {
                tool.execute(ctx, &step.arguments)
                    .await
                    .map_err(|err| AgentError::tool(&step.tool, err.to_string()))?;
            }
        }
        let url = ctx
            .page
            .current_url()
            .await
            .map_err(|err| AgentError::tool(&step.tool, err.to_string()))?;
        debug!(step = index + 1, tool = %step.tool, %url, "replayed step");
        actions.extend(step.actions.iter().cloned().map(|action| action.stamped(&url)));
    }
    Ok(actions)
}
