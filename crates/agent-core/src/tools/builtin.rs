//! Built-in browser tools wrapping [`AgentPage`](crate::page::AgentPage) primitives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use soulpilot_core_types::ToolCall;
use soulpilot_llm::{ChatMessage, ChatRequest, ObjectSchema};

use super::{parse_args, AgentTool, ToolContext, ToolError};
use crate::model::AgentAction;
use crate::page::ScrollDirection;

/// Reserved tool that ends the run; handled by the step processor itself.
pub const CLOSE_TOOL: &str = "close";

const MAX_WAIT_MS: u64 = 30_000;
const DEFAULT_SCROLL_PIXELS: u32 = 600;
const MAX_TREE_CHARS: usize = 40_000;

pub fn builtin_tools() -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(GotoTool),
        Arc::new(ClickTool),
        Arc::new(TypeTool),
        Arc::new(ScrollTool),
        Arc::new(ScreenshotTool),
        Arc::new(AriaTreeTool),
        Arc::new(WaitTool),
        Arc::new(NavBackTool),
        Arc::new(ExtractTool),
        Arc::new(CloseTool),
    ]
}

fn schema_of<T: JsonSchema>(name: &str) -> Value {
    ObjectSchema::of::<T>(name).schema
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GotoArgs {
    /// Absolute URL to open.
    pub url: String,
}

struct GotoTool;

#[async_trait]
impl AgentTool for GotoTool {
    fn name(&self) -> &str {
        "goto"
    }

    fn description(&self) -> &str {
        "Navigate the current page to a URL."
    }

    fn input_schema(&self) -> Value {
        schema_of::<GotoArgs>("goto")
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let args: GotoArgs = parse_args(self.name(), arguments)?;
        ctx.page.navigate(&args.url).await?;
        Ok(json!({ "success": true, "url": args.url }))
    }

    fn actions_for(&self, call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        let mut action = AgentAction::new(self.name());
        action.url = call.str_arg("url").map(str::to_string);
        vec![action]
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ClickArgs {
    /// Selector or short description of the element to click.
    target: String,
}

struct ClickTool;

#[async_trait]
impl AgentTool for ClickTool {
    fn name(&self) -> &str {
        "click"
    }

    fn description(&self) -> &str {
        "Click an element, given a selector or a short description of it."
    }

    fn input_schema(&self) -> Value {
        schema_of::<ClickArgs>("click")
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let args: ClickArgs = parse_args(self.name(), arguments)?;
        ctx.page.click(&args.target).await?;
        Ok(json!({ "success": true }))
    }

    fn actions_for(&self, call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        let mut action = AgentAction::new(self.name());
        action.instruction = call.str_arg("target").map(str::to_string);
        vec![action]
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TypeArgs {
    /// Selector or short description of the input.
    target: String,
    text: String,
    /// Press Enter after typing.
    #[serde(default)]
    submit: bool,
}

struct TypeTool;

#[async_trait]
impl AgentTool for TypeTool {
    fn name(&self) -> &str {
        "type"
    }

    fn description(&self) -> &str {
        "Type text into an input field, optionally submitting it."
    }

    fn input_schema(&self) -> Value {
        schema_of::<TypeArgs>("type")
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let args: TypeArgs = parse_args(self.name(), arguments)?;
        ctx.page
            .type_text(&args.target, &args.text, args.submit)
            .await?;
        Ok(json!({ "success": true }))
    }

    fn actions_for(&self, call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        let mut action = AgentAction::new(self.name());
        action.instruction = call.str_arg("target").map(str::to_string);
        action.arguments = Some(call.arguments.clone());
        vec![action]
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ScrollArgs {
    direction: ScrollDirection,
    #[serde(default)]
    pixels: Option<u32>,
}

struct ScrollTool;

#[async_trait]
impl AgentTool for ScrollTool {
    fn name(&self) -> &str {
        "scroll"
    }

    fn description(&self) -> &str {
        "Scroll the page up or down by a number of pixels."
    }

    fn input_schema(&self) -> Value {
        schema_of::<ScrollArgs>("scroll")
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let args: ScrollArgs = parse_args(self.name(), arguments)?;
        let pixels = args.pixels.unwrap_or(DEFAULT_SCROLL_PIXELS);
        ctx.page.scroll(args.direction, pixels).await?;
        Ok(json!({ "success": true, "pixels": pixels }))
    }
}

struct ScreenshotTool;

#[async_trait]
impl AgentTool for ScreenshotTool {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn description(&self) -> &str {
        "Capture the visible viewport."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _arguments: &Value) -> Result<Value, ToolError> {
        let png = ctx.page.screenshot().await?;
        Ok(json!({ "success": true, "bytes": png.len() }))
    }

    fn actions_for(&self, _call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        vec![AgentAction::new(self.name())]
    }

    fn replays(&self) -> bool {
        false
    }
}

struct AriaTreeTool;

#[async_trait]
impl AgentTool for AriaTreeTool {
    fn name(&self) -> &str {
        "ariaTree"
    }

    fn description(&self) -> &str {
        "Read the accessibility tree of the current page."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _arguments: &Value) -> Result<Value, ToolError> {
        let tree = ctx.page.accessibility_tree().await?;
        let truncated = tree.chars().count() > MAX_TREE_CHARS;
        let tree: String = tree.chars().take(MAX_TREE_CHARS).collect();
        Ok(json!({ "tree": tree, "truncated": truncated }))
    }

    fn actions_for(&self, _call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        vec![AgentAction::new(self.name())]
    }

    fn replays(&self) -> bool {
        false
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WaitArgs {
    /// Milliseconds to wait, capped at 30 seconds.
    time_ms: u64,
}

struct WaitTool;

#[async_trait]
impl AgentTool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for the page to settle."
    }

    fn input_schema(&self) -> Value {
        schema_of::<WaitArgs>("wait")
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let args: WaitArgs = parse_args(self.name(), arguments)?;
        let time_ms = args.time_ms.min(MAX_WAIT_MS);
        ctx.page.wait(Duration::from_millis(time_ms)).await?;
        Ok(json!({ "success": true, "time_ms": time_ms }))
    }

    fn actions_for(&self, _call: &ToolCall, output: &Value) -> Vec<AgentAction> {
        let mut action = AgentAction::new(self.name());
        action.time_ms = output.get("time_ms").and_then(Value::as_u64);
        vec![action]
    }
}

struct NavBackTool;

#[async_trait]
impl AgentTool for NavBackTool {
    fn name(&self) -> &str {
        "navback"
    }

    fn description(&self) -> &str {
        "Go back to the previous page in history."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _arguments: &Value) -> Result<Value, ToolError> {
        ctx.page.go_back().await?;
        Ok(json!({ "success": true }))
    }

    fn actions_for(&self, _call: &ToolCall, _output: &Value) -> Vec<AgentAction> {
        vec![AgentAction::new(self.name())]
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractArgs {
    /// What to pull out of the page.
    instruction: String,
    /// Optional JSON schema for the result.
    #[serde(default)]
    schema: Option<Value>,
}

struct ExtractTool;

impl ExtractTool {
    fn default_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "extraction": { "type": "string" } },
            "required": ["extraction"]
        })
    }
}

#[async_trait]
impl AgentTool for ExtractTool {
    fn name(&self) -> &str {
        "extract"
    }

    fn description(&self) -> &str {
        "Extract structured data from the current page."
    }

    fn input_schema(&self) -> Value {
        schema_of::<ExtractArgs>("extract")
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &Value) -> Result<Value, ToolError> {
        let args: ExtractArgs = parse_args(self.name(), arguments)?;
        let tree = ctx.page.accessibility_tree().await?;
        let tree: String = tree.chars().take(MAX_TREE_CHARS).collect();
        let request = ChatRequest::new(
            Some("You extract data from web pages. Use only what the page shows.".to_string()),
            vec![ChatMessage::user(format!(
                "Instruction: {}\n\nPage accessibility tree:\n{}",
                args.instruction, tree
            ))],
        );
        let schema = ObjectSchema::new(
            "extraction",
            args.schema.unwrap_or_else(Self::default_schema),
        );
        let value = ctx
            .execution_model
            .generate_object(&request, &schema)
            .await?;
        Ok(value)
    }

    fn actions_for(&self, call: &ToolCall, output: &Value) -> Vec<AgentAction> {
        let mut action = AgentAction::new(self.name());
        action.instruction = call.str_arg("instruction").map(str::to_string);
        action.extracted = Some(output.clone());
        vec![action]
    }

    fn replays(&self) -> bool {
        false
    }
}

/// Schema only: the step processor handles `close` itself.
#[derive(JsonSchema)]
#[allow(dead_code)]
struct CloseArgs {
    /// Summary of what was achieved.
    reasoning: String,
    /// Whether the task was accomplished.
    #[serde(rename = "taskComplete")]
    task_complete: bool,
}

/// Advertises `close` to the model. Calls never reach [`AgentTool::execute`].
struct CloseTool;

#[async_trait]
impl AgentTool for CloseTool {
    fn name(&self) -> &str {
        CLOSE_TOOL
    }

    fn description(&self) -> &str {
        "Finish the task. Call exactly once when done or when the task cannot be completed."
    }

    fn input_schema(&self) -> Value {
        schema_of::<CloseArgs>(CLOSE_TOOL)
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: &Value) -> Result<Value, ToolError> {
        Err(ToolError::failed("close is handled by the agent loop"))
    }

    fn replays(&self) -> bool {
        false
    }
}
