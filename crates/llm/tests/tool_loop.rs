use async_trait::async_trait;
use serde_json::json;

use soulpilot_core_types::ToolCall;
use soulpilot_llm::{
    ChatCompletion, ChatMessage, ChatRequest, HookAbort, LlmClient, LlmError, ObjectSchema,
    ScriptedLlmClient, StepEvent, ToolLoopHooks, ToolOutput,
};

#[derive(Default)]
struct RecordingHooks {
    executed: Vec<String>,
    steps_seen: Vec<u32>,
    abort_at: Option<u32>,
}

#[async_trait]
impl ToolLoopHooks for RecordingHooks {
    async fn before_step(&mut self, step: u32) -> Result<(), HookAbort> {
        if self.abort_at == Some(step) {
            return Err(HookAbort("paused".into()));
        }
        Ok(())
    }

    async fn execute_tool(&mut self, call: &ToolCall, _reasoning: Option<&str>) -> ToolOutput {
        self.executed.push(call.tool.clone());
        ToolOutput::ok(call, json!({"ok": true}))
    }

    async fn after_step(&mut self, event: &StepEvent) {
        self.steps_seen.push(event.step);
    }
}

fn call(tool: &str) -> ToolCall {
    ToolCall::with_generated_id(tool, json!({}))
}

fn request() -> ChatRequest {
    ChatRequest::new(Some("agent".into()), vec![ChatMessage::user("go")])
}

#[tokio::test]
async fn loop_stops_when_predicate_matches() {
    let client = ScriptedLlmClient::new("scripted-model")
        .reply(ChatCompletion::tool_calls(Some("navigating".into()), vec![call("goto")]))
        .reply(ChatCompletion::tool_calls(None, vec![call("close")]))
        .reply(ChatCompletion::tool_calls(None, vec![call("click")]));
    let mut hooks = RecordingHooks::default();

    let outcome = client
        .run_tool_loop(&request(), &mut hooks, &|event: &StepEvent| event.called("close"))
        .await
        .expect("loop");

    assert_eq!(outcome.steps, 2);
    assert_eq!(hooks.executed, vec!["goto", "close"]);
    assert_eq!(hooks.steps_seen, vec![1, 2]);
    assert_eq!(client.remaining(), 1);

    // second request carries the assistant turn and the tool results
    let second = &client.requests()[1];
    assert_eq!(second.messages.len(), 3);
}

#[tokio::test]
async fn loop_ends_on_plain_text_reply() {
    let client = ScriptedLlmClient::new("m").reply(ChatCompletion::text("all done"));
    let mut hooks = RecordingHooks::default();
    let outcome = client
        .run_tool_loop(&request(), &mut hooks, &|_: &StepEvent| false)
        .await
        .expect("loop");
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.final_text.as_deref(), Some("all done"));
    assert!(hooks.executed.is_empty());
}

#[tokio::test]
async fn hook_abort_ends_loop_without_error() {
    let client = ScriptedLlmClient::new("m")
        .reply(ChatCompletion::tool_calls(None, vec![call("scroll")]))
        .reply(ChatCompletion::tool_calls(None, vec![call("scroll")]));
    let mut hooks = RecordingHooks {
        abort_at: Some(2),
        ..Default::default()
    };
    let outcome = client
        .run_tool_loop(&request(), &mut hooks, &|_: &StepEvent| false)
        .await
        .expect("loop");
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.aborted, Some(HookAbort("paused".into())));
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn provider_errors_propagate_from_loop() {
    let client = ScriptedLlmClient::new("m").fail(LlmError::provider("boom", Some(500)));
    let mut hooks = RecordingHooks::default();
    let err = client
        .run_tool_loop(&request(), &mut hooks, &|_: &StepEvent| false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn generate_object_retries_malformed_output() {
    let client = ScriptedLlmClient::new("m")
        .reply(ChatCompletion::text("I think the title is Rust"))
        .reply(ChatCompletion::text("```json\n{\"title\": \"Rust\"}\n```"));
    let schema = ObjectSchema::new("headline", json!({"type": "object", "required": ["title"]}));

    let value = client
        .generate_object(&request(), &schema)
        .await
        .expect("object");
    assert_eq!(value["title"], "Rust");
    assert_eq!(client.call_count(), 2);
    let system = client.requests()[0].system.clone().unwrap_or_default();
    assert!(system.contains("headline"));
    assert!(client.requests()[0].tools.is_empty());
}

#[tokio::test]
async fn generate_object_retries_wrongly_typed_fields() {
    let client = ScriptedLlmClient::new("m")
        .reply(ChatCompletion::text("{\"title\": \"Rust\", \"score\": \"high\"}"))
        .reply(ChatCompletion::text("{\"title\": \"Rust\", \"score\": 9}"));
    let schema = ObjectSchema::new(
        "headline",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "score": { "type": "integer" }
            },
            "required": ["title"]
        }),
    );

    let value = client
        .generate_object(&request(), &schema)
        .await
        .expect("object");
    assert_eq!(value["score"], 9);
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn generate_object_gives_up_after_policy_attempts() {
    let client = ScriptedLlmClient::new("m")
        .reply(ChatCompletion::text("nope"))
        .reply(ChatCompletion::text("still nope"))
        .reply(ChatCompletion::text("never"))
        .reply(ChatCompletion::text("{\"title\": \"late\"}"));
    let schema = ObjectSchema::new("headline", json!({"required": ["title"]}));
    let err = client.generate_object(&request(), &schema).await.unwrap_err();
    assert!(matches!(err, LlmError::MalformedOutput(_)));
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn generate_object_does_not_retry_configuration_errors() {
    let client = ScriptedLlmClient::new("m")
        .fail(LlmError::configuration("no key"))
        .reply(ChatCompletion::text("{\"title\": \"x\"}"));
    let schema = ObjectSchema::new("headline", json!({"required": ["title"]}));
    let err = client.generate_object(&request(), &schema).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(client.call_count(), 1);
}
