use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{debug, error};

use soulpilot_llm::TokenUsage;

static AGENT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();
static INFERENCE_TOKENS: OnceCell<IntCounterVec> = OnceCell::new();
static INFERENCE_MS: OnceCell<IntCounterVec> = OnceCell::new();
static CACHE_EVENTS: OnceCell<IntCounterVec> = OnceCell::new();
static RUNS: OnceCell<IntCounterVec> = OnceCell::new();

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = registry();
        let _ = INFERENCE_TOKENS.set(counter(
            registry,
            "soul_agent_inference_tokens_total",
            "Tokens consumed by agent inference grouped by function kind and token class",
            &["kind", "token"],
        ));
        let _ = INFERENCE_MS.set(counter(
            registry,
            "soul_agent_inference_ms_total",
            "Milliseconds spent waiting on model inference",
            &["kind"],
        ));
        let _ = CACHE_EVENTS.set(counter(
            registry,
            "soul_agent_cache_events_total",
            "Agent replay cache operations by event",
            &["event"],
        ));
        let _ = RUNS.set(counter(
            registry,
            "soul_agent_runs_total",
            "Finished agent runs by outcome",
            &["outcome"],
        ));
    });
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("create agent counter");
    if let Err(err) = registry.register(Box::new(counter.clone())) {
        error!(?err, %name, "failed to register agent counter");
    }
    counter
}

pub fn registry() -> &'static Registry {
    &AGENT_REGISTRY
}

/// Counts one inference call of `kind` (for example `agent` or `extract`).
pub fn record_inference(kind: &str, usage: &TokenUsage, inference_ms: u64) {
    register_metrics();
    if let Some(tokens) = INFERENCE_TOKENS.get() {
        tokens
            .with_label_values(&[kind, "prompt"])
            .inc_by(usage.input_tokens);
        tokens
            .with_label_values(&[kind, "completion"])
            .inc_by(usage.output_tokens);
        tokens
            .with_label_values(&[kind, "reasoning"])
            .inc_by(usage.reasoning_tokens);
        tokens
            .with_label_values(&[kind, "cached_input"])
            .inc_by(usage.cached_input_tokens);
    }
    if let Some(elapsed) = INFERENCE_MS.get() {
        elapsed.with_label_values(&[kind]).inc_by(inference_ms);
    }
    debug!(
        target: "agent_metrics",
        %kind,
        prompt = usage.input_tokens,
        completion = usage.output_tokens,
        inference_ms,
        "inference recorded"
    );
}

pub fn record_cache_event(event: &str) {
    register_metrics();
    if let Some(counter) = CACHE_EVENTS.get() {
        counter.with_label_values(&[event]).inc();
    }
    debug!(target: "agent_cache", %event, "agent cache metric");
}

pub fn record_run(outcome: &str) {
    register_metrics();
    if let Some(counter) = RUNS.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Text exposition of every agent metric.
pub fn gather_text() -> String {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry().gather(), &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
