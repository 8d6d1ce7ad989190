//! Public entry point: `orchestrator.agent(config).execute(options)`.
//!
//! The orchestrator owns model resolution, the active page, the optional
//! replay cache and the optional computer-use backend. Each execution
//! runs on its own task; [`AgentHandle::execute`] just awaits the stream.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, warn};

use soulpilot_core_types::InstanceId;
use soulpilot_llm::{LlmClient, LlmError};

use crate::agent_loop::{
    spawn_run, AgentBackend, AgentExecution, AgentLoopConfig, AgentLoopController, AgentRun,
    AgentStreamResult,
    BackendKind, DirectRestBackend, RestEndpoint, RetryPolicy, SdkToolCallingBackend,
};
use crate::cache::{
    build_config_signature, signature_with_tools, AgentCache, CacheInput, RecordingSession,
};
use crate::cua::{ComputerUseBackend, CuaRun};
use crate::errors::AgentError;
use crate::metrics::record_run;
use crate::model::AgentResult;
use crate::options::{AgentConfig, AgentExecuteOptions};
use crate::page::PageHandle;
use crate::registry::ManagedInstance;
use crate::tools::{AgentTool, ToolContext, ToolSet};

/// Maps model selectors to clients.
pub trait LlmResolver: Send + Sync {
    /// Model used when the agent config names none.
    fn default_model(&self) -> String;

    fn resolve(&self, selector: Option<&str>) -> Result<Arc<dyn LlmClient>, LlmError>;

    /// A raw messages endpoint for the selector, when one is configured.
    /// Returning `Some` makes the direct REST backend eligible.
    fn resolve_rest(&self, _selector: Option<&str>) -> Result<Option<RestEndpoint>, LlmError> {
        Ok(None)
    }
}

/// Resolves every selector to the same client.
pub struct StaticLlmResolver {
    client: Arc<dyn LlmClient>,
    rest: Option<RestEndpoint>,
}

impl StaticLlmResolver {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, rest: None }
    }

    pub fn with_rest(mut self, endpoint: RestEndpoint) -> Self {
        self.rest = Some(endpoint);
        self
    }
}

impl LlmResolver for StaticLlmResolver {
    fn default_model(&self) -> String {
        self.client.model_name().to_string()
    }

    fn resolve(&self, _selector: Option<&str>) -> Result<Arc<dyn LlmClient>, LlmError> {
        Ok(self.client.clone())
    }

    fn resolve_rest(&self, _selector: Option<&str>) -> Result<Option<RestEndpoint>, LlmError> {
        Ok(self.rest.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Force a backend; `None` picks direct REST whenever an endpoint resolves.
    pub backend: Option<BackendKind>,
    pub rest_retry: RetryPolicy,
}

struct OrchestratorInner {
    id: InstanceId,
    resolver: Arc<dyn LlmResolver>,
    cache: Option<Arc<AgentCache>>,
    cua: Option<Arc<dyn ComputerUseBackend>>,
    active_page: RwLock<Option<PageHandle>>,
    options: OrchestratorOptions,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

pub struct OrchestratorBuilder {
    resolver: Arc<dyn LlmResolver>,
    cache: Option<Arc<AgentCache>>,
    cua: Option<Arc<dyn ComputerUseBackend>>,
    page: Option<PageHandle>,
    options: OrchestratorOptions,
}

impl OrchestratorBuilder {
    pub fn cache(mut self, cache: Arc<AgentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn computer_use(mut self, backend: Arc<dyn ComputerUseBackend>) -> Self {
        self.cua = Some(backend);
        self
    }

    pub fn page(mut self, page: PageHandle) -> Self {
        self.page = Some(page);
        self
    }

    pub fn options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            inner: Arc::new(OrchestratorInner {
                id: InstanceId::new(),
                resolver: self.resolver,
                cache: self.cache,
                cua: self.cua,
                active_page: RwLock::new(self.page),
                options: self.options,
            }),
        }
    }
}

impl Orchestrator {
    pub fn builder(resolver: Arc<dyn LlmResolver>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            resolver,
            cache: None,
            cua: None,
            page: None,
            options: OrchestratorOptions::default(),
        }
    }

    pub fn new(resolver: Arc<dyn LlmResolver>) -> Self {
        Self::builder(resolver).build()
    }

    pub fn id(&self) -> &InstanceId {
        &self.inner.id
    }

    pub fn cache(&self) -> Option<&Arc<AgentCache>> {
        self.inner.cache.as_ref()
    }

    pub fn set_active_page(&self, page: Option<PageHandle>) {
        *self.inner.active_page.write() = page;
    }

    pub fn active_page(&self) -> Option<PageHandle> {
        self.inner.active_page.read().clone()
    }

    pub fn agent(&self, config: AgentConfig) -> AgentHandle {
        AgentHandle {
            inner: self.inner.clone(),
            config,
        }
    }

    /// Drops the active page and any unfinished recording session.
    pub fn close(&self) {
        self.set_active_page(None);
        if let Some(cache) = &self.inner.cache {
            cache.discard_recording();
        }
        info!(instance = %self.inner.id, "orchestrator closed");
    }
}

#[async_trait]
impl ManagedInstance for Orchestrator {
    fn instance_id(&self) -> InstanceId {
        self.inner.id.clone()
    }

    async fn shutdown(&self) {
        self.close();
    }
}

/// An agent bound to one configuration. Cheap to clone and reuse.
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<OrchestratorInner>,
    config: AgentConfig,
}

impl AgentHandle {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Runs to completion.
    ///
    /// Only misconfiguration is returned as `Err`; anything that goes wrong
    /// once the run has started comes back as `success: false`. Agents built
    /// with `stream` set are rejected here; use [`Self::start`] or
    /// [`Self::execute_stream`] for them.
    pub async fn execute(
        &self,
        options: impl Into<AgentExecuteOptions>,
    ) -> Result<AgentResult, AgentError> {
        if self.config.stream {
            return Err(AgentError::configuration(
                "agent is configured for streaming; call start or execute_stream",
            ));
        }
        let stream = self.execute_stream(options).await?;
        Ok(stream.into_result().await)
    }

    /// Starts a run shaped by `AgentConfig::stream`: the live stream when set,
    /// otherwise the finished result.
    pub async fn start(
        &self,
        options: impl Into<AgentExecuteOptions>,
    ) -> Result<AgentExecution, AgentError> {
        let stream = self.execute_stream(options).await?;
        if self.config.stream {
            Ok(AgentExecution::Streaming(stream))
        } else {
            Ok(AgentExecution::Completed(stream.into_result().await))
        }
    }

    /// Starts the run and returns its event stream with a handle to the result.
    pub async fn execute_stream(
        &self,
        options: impl Into<AgentExecuteOptions>,
    ) -> Result<AgentStreamResult, AgentError> {
        let options = options.into();
        let instruction = options.instruction.trim().to_string();
        if instruction.is_empty() {
            return Err(AgentError::configuration("instruction must not be empty"));
        }
        let page = options
            .page
            .clone()
            .or_else(|| self.inner.active_page.read().clone())
            .ok_or_else(|| {
                AgentError::configuration("no page: pass one in the options or set an active page")
            })?;

        let resolver = &self.inner.resolver;
        let model = resolver.resolve(self.config.model.as_deref())?;
        let execution_model = match self.config.execution_model.as_deref() {
            Some(selector) => resolver.resolve(Some(selector))?,
            None => model.clone(),
        };
        let tool_context = ToolContext {
            page,
            execution_model: execution_model.clone(),
        };

        if self.config.cua {
            return self.start_computer_use(options, instruction, model, execution_model, tool_context);
        }

        let backend = self.select_backend(model.clone())?;
        let kind = backend.kind();
        let signature = build_config_signature(
            &self.config,
            model.model_name(),
            execution_model.model_name(),
            kind,
        );
        let loop_config = AgentLoopConfig::new()
            .max_steps(options.max_steps)
            .rest_retry(self.inner.options.rest_retry);
        let cache = self.inner.cache.clone();
        let config = self.config.clone();

        debug!(backend = kind.as_str(), model = model.model_name(), "agent execution accepted");

        Ok(spawn_run(move |events| async move {
            let tools = match collect_tools(&config).await {
                Ok(tools) => tools,
                Err(err) => return finish(AgentResult::failed(err, Vec::new())),
            };
            let signature = signature_with_tools(&signature, &tools);
            let start_url = match tool_context.page.current_url().await {
                Ok(url) => url,
                Err(err) => return finish(AgentResult::failed(err, Vec::new())),
            };
            let cached = CachedRun {
                cache,
                instruction: &instruction,
                options: &options,
                signature: &signature,
                start_url: &start_url,
            };
            let result = cached
                .run(&tools, &tool_context, |recorder| {
                    let run = AgentRun {
                        instruction: instruction.clone(),
                        system_prompt: config.system_prompt.clone(),
                        tools: tools.clone(),
                        tool_context: tool_context.clone(),
                        backend,
                        on_step: options.on_step.clone(),
                        check_pause_state: options.check_pause_state.clone(),
                        recorder,
                    };
                    async move {
                        AgentLoopController::new(loop_config)
                            .run(run, Some(events))
                            .await
                    }
                })
                .await;
            finish(result)
        }))
    }

    fn select_backend(&self, model: Arc<dyn LlmClient>) -> Result<Arc<dyn AgentBackend>, AgentError> {
        let rest = self
            .inner
            .resolver
            .resolve_rest(self.config.model.as_deref())?;
        let retry = self.inner.options.rest_retry;
        match (self.inner.options.backend, rest) {
            (Some(BackendKind::SdkToolCalling), _) | (None, None) => {
                Ok(Arc::new(SdkToolCallingBackend::new(model)))
            }
            (Some(BackendKind::DirectRest) | None, Some(endpoint)) => {
                Ok(Arc::new(DirectRestBackend::new(endpoint, retry)))
            }
            (Some(BackendKind::DirectRest), None) => Err(AgentError::configuration(
                "direct REST backend selected but no REST endpoint is configured for this model",
            )),
        }
    }

    fn start_computer_use(
        &self,
        options: AgentExecuteOptions,
        instruction: String,
        model: Arc<dyn LlmClient>,
        execution_model: Arc<dyn LlmClient>,
        tool_context: ToolContext,
    ) -> Result<AgentStreamResult, AgentError> {
        let cua = self.inner.cua.clone().ok_or_else(|| {
            AgentError::configuration("computer-use requested but no computer-use backend is registered")
        })?;
        let model_name = model.model_name().to_string();
        if !cua.supports_model(&model_name) {
            return Err(AgentError::configuration(format!(
                "model '{model_name}' does not support computer use"
            )));
        }
        let signature = build_config_signature(
            &self.config,
            &model_name,
            execution_model.model_name(),
            BackendKind::SdkToolCalling,
        );
        let mut tools = ToolSet::new();
        for tool in cua.replay_tools() {
            tools.insert(tool, "computer-use");
        }
        let signature = signature_with_tools(&signature, &tools);
        let cache = self.inner.cache.clone();

        Ok(spawn_run(move |_events| async move {
            let start_url = match tool_context.page.current_url().await {
                Ok(url) => url,
                Err(err) => return finish(AgentResult::failed(err, Vec::new())),
            };
            let cached = CachedRun {
                cache,
                instruction: &instruction,
                options: &options,
                signature: &signature,
                start_url: &start_url,
            };
            let result = cached
                .run(&tools, &tool_context, |recorder| {
                    let run = CuaRun {
                        instruction: instruction.clone(),
                        model: model_name.clone(),
                        max_steps: options.max_steps.max(1),
                        page: tool_context.page.clone(),
                        on_step: options.on_step.clone(),
                        check_pause_state: options.check_pause_state.clone(),
                        recorder,
                    };
                    async move { cua.run(run).await }
                })
                .await;
            finish(result)
        }))
    }
}

/// Lists every integration and merges its tools behind the caller's.
async fn collect_tools(config: &AgentConfig) -> Result<ToolSet, AgentError> {
    let mut integration_tools: Vec<(String, Vec<Arc<dyn AgentTool>>)> = Vec::new();
    for provider in &config.integrations {
        let tools = provider
            .list_tools()
            .await
            .map_err(|err| AgentError::tool(provider.id(), err.to_string()))?;
        debug!(integration = provider.id(), tools = tools.len(), "integration tools listed");
        integration_tools.push((provider.id().to_string(), tools));
    }
    Ok(ToolSet::assemble(&config.tools, integration_tools))
}

/// Replay-or-record wrapper shared by the tool loop and computer use.
struct CachedRun<'a> {
    cache: Option<Arc<AgentCache>>,
    instruction: &'a str,
    options: &'a AgentExecuteOptions,
    signature: &'a str,
    start_url: &'a str,
}

impl CachedRun<'_> {
    async fn run<F, Fut>(self, tools: &ToolSet, ctx: &ToolContext, live: F) -> AgentResult
    where
        F: FnOnce(Option<RecordingSession>) -> Fut,
        Fut: Future<Output = AgentResult>,
    {
        let Some(cache) = self.cache else {
            return live(None).await;
        };
        let Some(context) = cache.prepare_context(CacheInput {
            instruction: self.instruction,
            options: self.options,
            config_signature: self.signature,
            start_url: self.start_url,
        }) else {
            return live(None).await;
        };
        match cache.try_replay(&context, tools, ctx).await {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(err) => {
                // The partial replay has moved the page away from `start_url`,
                // so a live run from here must not be stored under this fingerprint.
                cache.evict(&context).await;
                warn!(
                    fingerprint = %context.fingerprint,
                    error = %err,
                    "replay failed; running live without recording"
                );
                return live(None).await;
            }
        }
        let Some(flight) = cache.claim_flight(&context.fingerprint) else {
            warn!(
                fingerprint = %context.fingerprint,
                "identical run already recording; running without cache"
            );
            return live(None).await;
        };

        let session = cache.begin_recording(flight);
        let result = live(Some(session.clone())).await;
        let steps = session.end_recording();
        cache.store(&context, steps, &result).await;
        result
    }
}

fn finish(result: AgentResult) -> AgentResult {
    let replayed = result
        .metadata
        .as_ref()
        .and_then(|meta| meta.get("cacheHit"))
        .and_then(|hit| hit.as_bool())
        .unwrap_or(false);
    let outcome = match (replayed, result.success, result.completed) {
        (true, _, _) => "replayed",
        (false, true, _) => "success",
        (false, false, true) => "incomplete",
        (false, false, false) => "failed",
    };
    record_run(outcome);
    if !result.success {
        debug!(message = %result.message, metadata = %json!(result.metadata), "agent run unsuccessful");
    }
    result
}
