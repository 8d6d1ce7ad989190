//! Streaming surface of an agent run.
//!
//! Every run executes on a spawned task that publishes [`AgentStreamEvent`]s;
//! the non-streaming entry point simply awaits the terminal result.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::error;

use crate::model::{AgentResult, AgentStepUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStreamEvent {
    StepStarted(AgentStepUpdate),
    /// Assistant text produced during a step.
    TextDelta(String),
    StepFinished(AgentStepUpdate),
    Finished(AgentResult),
}

pub type EventSender = UnboundedSender<AgentStreamEvent>;

pub struct AgentStreamResult {
    pub events: UnboundedReceiver<AgentStreamEvent>,
    /// Resolves once the run ends, whether or not `events` was drained.
    pub result: BoxFuture<'static, AgentResult>,
}

impl AgentStreamResult {
    /// Drops the event stream and waits for the outcome.
    pub async fn into_result(self) -> AgentResult {
        drop(self.events);
        self.result.await
    }
}

/// Outcome of [`AgentHandle::start`](crate::orchestrator::AgentHandle::start),
/// shaped by `AgentConfig::stream`.
#[derive(Debug)]
pub enum AgentExecution {
    Completed(AgentResult),
    Streaming(AgentStreamResult),
}

impl AgentExecution {
    pub fn is_streaming(&self) -> bool {
        matches!(self, AgentExecution::Streaming(_))
    }

    pub async fn into_result(self) -> AgentResult {
        match self {
            AgentExecution::Completed(result) => result,
            AgentExecution::Streaming(stream) => stream.into_result().await,
        }
    }
}

impl std::fmt::Debug for AgentStreamResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStreamResult").finish_non_exhaustive()
    }
}

/// Spawns the run built by `start` and wires its events to the returned stream.
/// A `Finished` event is always the last one sent.
pub fn spawn_run<F, Fut>(start: F) -> AgentStreamResult
where
    F: FnOnce(EventSender) -> Fut,
    Fut: Future<Output = AgentResult> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let run = start(tx.clone());
    let handle = tokio::spawn(async move {
        let result = run.await;
        let _ = tx.send(AgentStreamEvent::Finished(result.clone()));
        result
    });
    let result = async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "agent task ended abnormally");
                AgentResult::failed(format!("agent task aborted: {err}"), Vec::new())
            }
        }
    }
    .boxed();
    AgentStreamResult { events: rx, result }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_event_closes_the_stream() {
        let mut stream = spawn_run(|tx| async move {
            let _ = tx.send(AgentStreamEvent::TextDelta("hello".into()));
            AgentResult::failed("nothing to do", Vec::new())
        });
        let mut seen = Vec::new();
        while let Some(event) = stream.events.recv().await {
            seen.push(event);
        }
        assert!(matches!(seen[0], AgentStreamEvent::TextDelta(_)));
        assert!(matches!(seen.last(), Some(AgentStreamEvent::Finished(_))));
        let result = stream.result.await;
        assert!(!result.success);
    }
}
