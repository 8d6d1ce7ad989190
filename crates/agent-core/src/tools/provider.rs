use std::sync::Arc;

use async_trait::async_trait;

use super::{AgentTool, ToolError};

/// External tool source (an MCP-style server, a plugin host).
///
/// Its [`id`](ToolProvider::id) takes part in the agent config signature, so
/// swapping integrations invalidates cached replays.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<Arc<dyn AgentTool>>, ToolError>;
}
