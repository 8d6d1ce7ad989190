use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use agent_core::test_support::FakePage;
use agent_core::{
    AgentCache, AgentConfig, AgentExecuteOptions, AgentResult, AgentTool, Orchestrator,
    StaticLlmResolver, ToolContext, ToolError, ToolProvider,
};
use soulpilot_cache_store::{CacheStorage, FsCacheStorage, MemoryCacheStorage, StoragePolicy};
use soulpilot_core_types::ToolCall;
use soulpilot_llm::{ChatCompletion, ScriptedLlmClient, TokenUsage};

const START: &str = "https://start.test";

fn step(text: &str, calls: Vec<ToolCall>) -> ChatCompletion {
    ChatCompletion::tool_calls(Some(text.to_string()), calls).with_usage(TokenUsage {
        input_tokens: 100,
        output_tokens: 10,
        ..TokenUsage::default()
    })
}

fn call(id: &str, tool: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, tool, arguments)
}

fn close(id: &str, done: bool) -> ToolCall {
    call(id, "close", json!({ "reasoning": "finished", "taskComplete": done }))
}

fn checkout_script() -> ScriptedLlmClient {
    ScriptedLlmClient::new("scripted")
        .reply(step(
            "Open the shop.",
            vec![call("c1", "goto", json!({ "url": "https://shop.test" }))],
        ))
        .reply(step(
            "Buy it.",
            vec![
                call("c2", "ariaTree", json!({})),
                call("c3", "click", json!({ "target": "#buy" })),
            ],
        ))
        .reply(step("Bought.", vec![close("c4", true)]))
}

fn cached_orchestrator(
    llm: Arc<ScriptedLlmClient>,
    page: &Arc<FakePage>,
    storage: Arc<dyn CacheStorage>,
) -> Orchestrator {
    Orchestrator::builder(Arc::new(StaticLlmResolver::new(llm)))
        .page(page.handle())
        .cache(Arc::new(AgentCache::new(storage)))
        .build()
}

fn cache_hit(result: &AgentResult) -> bool {
    result
        .metadata
        .as_ref()
        .and_then(|m| m.get("cacheHit"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[tokio::test]
async fn second_identical_run_replays_without_inference() {
    let llm = Arc::new(checkout_script());
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let orchestrator = cached_orchestrator(llm.clone(), &page, storage.clone());
    let agent = orchestrator.agent(AgentConfig::new());

    let first = agent.execute("buy the item").await.expect("first run");
    assert!(first.success);
    assert!(!cache_hit(&first));
    assert_eq!(llm.call_count(), 3);
    assert_eq!(storage.len(), 1);
    assert_eq!(first.usage.expect("usage").input_tokens, 300);

    page.set_url(START);
    page.clear_operations();

    let second = agent.execute("buy the item").await.expect("second run");
    assert!(second.success);
    assert!(cache_hit(&second));
    assert_eq!(llm.call_count(), 3, "replay must not call the model");
    assert_eq!(second.message, first.message);
    assert_eq!(second.usage.expect("usage").input_tokens, 0);

    let kinds: Vec<&str> = second.actions.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(kinds, vec!["goto", "ariaTree", "click", "close"]);
    // Read-only steps are not re-executed on replay.
    assert_eq!(page.operations(), vec!["goto:https://shop.test", "click:#buy"]);
}

#[tokio::test]
async fn replay_is_repeatable() {
    let llm = Arc::new(checkout_script());
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let agent = cached_orchestrator(llm.clone(), &page, storage).agent(AgentConfig::new());

    agent.execute("buy the item").await.expect("record");
    let mut replays = Vec::new();
    for _ in 0..2 {
        page.set_url(START);
        page.clear_operations();
        let result = agent.execute("buy the item").await.expect("replay");
        replays.push((result.success, result.message.clone(), page.operations()));
    }

    assert_eq!(replays[0], replays[1]);
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn different_start_page_or_step_budget_misses() {
    let llm = Arc::new(checkout_script());
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let agent = cached_orchestrator(llm.clone(), &page, storage.clone()).agent(AgentConfig::new());

    agent.execute("buy the item").await.expect("record");
    assert_eq!(llm.call_count(), 3);

    page.set_url("https://elsewhere.test");
    let moved = agent.execute("buy the item").await.expect("moved");
    assert!(!cache_hit(&moved));
    assert_eq!(llm.call_count(), 4);

    page.set_url(START);
    let budget = agent
        .execute(AgentExecuteOptions::new("buy the item").max_steps(7))
        .await
        .expect("budget");
    assert!(!cache_hit(&budget));
    assert_eq!(llm.call_count(), 5);
}

#[tokio::test]
async fn failed_replay_falls_back_to_a_live_run() {
    let llm = Arc::new(checkout_script().reply(step("Cannot buy.", vec![close("c5", false)])));
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let agent = cached_orchestrator(llm.clone(), &page, storage.clone()).agent(AgentConfig::new());

    agent.execute("buy the item").await.expect("record");
    assert_eq!(storage.len(), 1);
    page.set_url(START);
    page.fail_on("#buy");

    let result = agent.execute("buy the item").await.expect("fallback");
    assert!(!cache_hit(&result));
    assert_eq!(llm.call_count(), 4);
    assert!(result.completed);
    assert!(!result.success);
    assert!(storage.is_empty(), "a script that failed to replay is evicted");
}

#[tokio::test]
async fn live_run_after_a_failed_replay_is_never_stored_for_the_start_page() {
    let llm = Arc::new(
        checkout_script()
            .reply(step(
                "Use the other button.",
                vec![call("c5", "click", json!({ "target": "#alt" }))],
            ))
            .reply(step("Bought.", vec![close("c6", true)]))
            .reply(step(
                "Open the shop.",
                vec![call("c7", "goto", json!({ "url": "https://shop.test" }))],
            ))
            .reply(step(
                "Buy it.",
                vec![call("c8", "click", json!({ "target": "#buy" }))],
            ))
            .reply(step("Bought.", vec![close("c9", true)])),
    );
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let agent = cached_orchestrator(llm.clone(), &page, storage.clone()).agent(AgentConfig::new());

    agent.execute("buy the item").await.expect("record");

    page.set_url(START);
    page.clear_operations();
    page.fail_on("#buy");
    let fallback = agent.execute("buy the item").await.expect("fallback");
    assert!(fallback.success);
    assert!(!cache_hit(&fallback));
    assert_eq!(llm.call_count(), 5);
    assert_eq!(page.operations(), vec!["goto:https://shop.test", "click:#alt"]);
    assert!(storage.is_empty(), "the fallback started mid-script and must not be stored");

    page.stop_failing("#buy");
    page.set_url(START);
    let rerecorded = agent.execute("buy the item").await.expect("record again");
    assert!(!cache_hit(&rerecorded));
    assert_eq!(llm.call_count(), 8);
    assert_eq!(storage.len(), 1);

    page.set_url(START);
    page.clear_operations();
    let replayed = agent.execute("buy the item").await.expect("replay");
    assert!(cache_hit(&replayed));
    assert_eq!(llm.call_count(), 8);
    assert_eq!(page.operations(), vec!["goto:https://shop.test", "click:#buy"]);
    assert_eq!(page.url(), "https://shop.test");
}

#[tokio::test]
async fn runs_sharing_a_cache_record_their_own_scripts() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let cache = Arc::new(AgentCache::new(storage.clone()));
    let shop_page = FakePage::shared(START);
    let docs_page = FakePage::shared(START);
    let shop = Orchestrator::builder(Arc::new(StaticLlmResolver::new(Arc::new(checkout_script()))))
        .page(shop_page.handle())
        .cache(cache.clone())
        .build();
    let docs_llm = ScriptedLlmClient::new("scripted")
        .reply(step(
            "Open the docs.",
            vec![call("d1", "goto", json!({ "url": "https://docs.test" }))],
        ))
        .reply(step("Opened.", vec![close("d2", true)]));
    let docs = Orchestrator::builder(Arc::new(StaticLlmResolver::new(Arc::new(docs_llm))))
        .page(docs_page.handle())
        .cache(cache.clone())
        .build();

    let shop_agent = shop.agent(AgentConfig::new());
    let docs_agent = docs.agent(AgentConfig::new());
    let (bought, opened) = tokio::join!(
        shop_agent.execute("buy the item"),
        docs_agent.execute("open the docs"),
    );
    assert!(bought.expect("shop").success);
    assert!(opened.expect("docs").success);
    assert_eq!(storage.len(), 2);
    assert_eq!(cache.active_recordings(), 0);

    for page in [&shop_page, &docs_page] {
        page.set_url(START);
        page.clear_operations();
    }
    let bought = shop_agent.execute("buy the item").await.expect("shop");
    let opened = docs_agent.execute("open the docs").await.expect("docs");
    assert!(cache_hit(&bought) && cache_hit(&opened));
    assert_eq!(shop_page.operations(), vec!["goto:https://shop.test", "click:#buy"]);
    assert_eq!(docs_page.operations(), vec!["goto:https://docs.test"]);
}

#[tokio::test]
async fn unsuccessful_and_volatile_runs_are_not_stored() {
    let llm = Arc::new(
        ScriptedLlmClient::new("scripted")
            .reply(step("Giving up.", vec![close("c1", false)]))
            .reply(step("Done.", vec![close("c2", true)]))
            .reply(step("Done.", vec![close("c3", true)])),
    );
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let agent = cached_orchestrator(llm.clone(), &page, storage.clone()).agent(AgentConfig::new());

    let failed = agent.execute("book a table").await.expect("run");
    assert!(!failed.success);
    assert!(storage.is_empty());

    agent.execute("show today's headlines").await.expect("run");
    agent.execute("show today's headlines").await.expect("run");
    assert!(storage.is_empty());
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn config_changes_invalidate_entries() {
    let llm = Arc::new(checkout_script().reply(step("Done.", vec![close("c9", true)])));
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let orchestrator = cached_orchestrator(llm.clone(), &page, storage);

    orchestrator
        .agent(AgentConfig::new())
        .execute("buy the item")
        .await
        .expect("record");
    page.set_url(START);

    let result = orchestrator
        .agent(AgentConfig::new().system_prompt("You are a careful shopper."))
        .execute("buy the item")
        .await
        .expect("different config");
    assert!(!cache_hit(&result));
    assert_eq!(llm.call_count(), 4);
}

struct SearchTool {
    description: String,
}

#[async_trait]
impl AgentTool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "query": { "type": "string" } } })
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: &Value) -> Result<Value, ToolError> {
        Ok(json!({ "hits": 1 }))
    }
}

/// Lists one `search` tool whose description can change between runs.
struct SearchIntegration {
    description: Mutex<String>,
}

#[async_trait]
impl ToolProvider for SearchIntegration {
    fn id(&self) -> &str {
        "search-server"
    }

    async fn list_tools(&self) -> Result<Vec<Arc<dyn AgentTool>>, ToolError> {
        Ok(vec![Arc::new(SearchTool {
            description: self.description.lock().clone(),
        })])
    }
}

#[tokio::test]
async fn changed_integration_listing_invalidates_entries() {
    let search = |id: &str| {
        step(
            "Searching.",
            vec![call(id, "search", json!({ "query": "socks" })), close("x", true)],
        )
    };
    let llm = Arc::new(
        ScriptedLlmClient::new("scripted")
            .reply(search("s1"))
            .reply(search("s2")),
    );
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let integration = Arc::new(SearchIntegration {
        description: Mutex::new("Search the catalogue.".into()),
    });
    let agent = cached_orchestrator(llm.clone(), &page, storage.clone())
        .agent(AgentConfig::new().integration(integration.clone()));

    agent.execute("search for socks").await.expect("record");
    let replayed = agent.execute("search for socks").await.expect("replay");
    assert!(cache_hit(&replayed));
    assert_eq!(llm.call_count(), 1);

    *integration.description.lock() = "Search the catalogue, newest first.".into();
    let relisted = agent.execute("search for socks").await.expect("relisted");
    assert!(!cache_hit(&relisted));
    assert_eq!(llm.call_count(), 2);
    assert_eq!(storage.len(), 2);
}

#[tokio::test]
async fn entries_survive_on_disk_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let policy = StoragePolicy::new(dir.path());
    let page = FakePage::shared(START);

    let recorder = Arc::new(checkout_script());
    let first = cached_orchestrator(
        recorder.clone(),
        &page,
        Arc::new(FsCacheStorage::new(policy.clone())),
    );
    let recorded = first
        .agent(AgentConfig::new())
        .execute("buy the item")
        .await
        .expect("record");
    assert!(recorded.success);

    let storage = FsCacheStorage::new(policy);
    let entries = storage.entries().await.expect("entries");
    assert_eq!(entries.len(), 1);

    page.set_url(START);
    page.clear_operations();
    let replayer = Arc::new(ScriptedLlmClient::new("scripted"));
    let second = cached_orchestrator(replayer.clone(), &page, Arc::new(storage));
    let replayed = second
        .agent(AgentConfig::new())
        .execute("buy   the item")
        .await
        .expect("replay");

    assert!(cache_hit(&replayed));
    assert_eq!(replayer.call_count(), 0);
    assert_eq!(page.operations(), vec!["goto:https://shop.test", "click:#buy"]);
}

#[tokio::test]
async fn disabled_cache_always_runs_live() {
    let llm = Arc::new(
        ScriptedLlmClient::new("scripted")
            .reply(step("Done.", vec![close("c1", true)]))
            .reply(step("Done.", vec![close("c2", true)])),
    );
    let page = FakePage::shared(START);
    let storage = Arc::new(MemoryCacheStorage::new());
    let orchestrator = Orchestrator::builder(Arc::new(StaticLlmResolver::new(llm.clone())))
        .page(page.handle())
        .cache(Arc::new(AgentCache::disabled(storage.clone())))
        .build();
    let agent = orchestrator.agent(AgentConfig::new());

    agent.execute("finish").await.expect("run");
    agent.execute("finish").await.expect("run");
    assert_eq!(llm.call_count(), 2);
    assert!(storage.is_empty());
}
