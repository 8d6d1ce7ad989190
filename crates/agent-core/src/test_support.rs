//! In-memory page for exercising agents without a browser.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::page::{AgentPage, PageError, PageHandle, ScrollDirection};

#[derive(Default)]
struct FakePageState {
    url: String,
    history: Vec<String>,
    operations: Vec<String>,
    failing_targets: HashSet<String>,
}

/// Records every operation as a short string, e.g. `click:#submit`.
#[derive(Default)]
pub struct FakePage {
    state: Mutex<FakePageState>,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(FakePageState {
                url: url.into(),
                ..FakePageState::default()
            }),
        }
    }

    pub fn shared(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(url))
    }

    pub fn handle(self: &Arc<Self>) -> PageHandle {
        self.clone()
    }

    /// Clicks and typing on `target` fail from now on.
    pub fn fail_on(&self, target: impl Into<String>) {
        self.state.lock().failing_targets.insert(target.into());
    }

    pub fn stop_failing(&self, target: &str) {
        self.state.lock().failing_targets.remove(target);
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }

    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    fn log(&self, entry: String) {
        self.state.lock().operations.push(entry);
    }

    fn check_target(&self, target: &str) -> Result<(), PageError> {
        if self.state.lock().failing_targets.contains(target) {
            return Err(PageError::new(format!("element not found: {target}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentPage for FakePage {
    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.url())
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.url, url.to_string());
        state.history.push(previous);
        state.operations.push(format!("goto:{url}"));
        Ok(())
    }

    async fn click(&self, target: &str) -> Result<(), PageError> {
        self.check_target(target)?;
        self.log(format!("click:{target}"));
        Ok(())
    }

    async fn type_text(&self, target: &str, text: &str, submit: bool) -> Result<(), PageError> {
        self.check_target(target)?;
        let suffix = if submit { ":submit" } else { "" };
        self.log(format!("type:{target}={text}{suffix}"));
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, pixels: u32) -> Result<(), PageError> {
        let direction = match direction {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        };
        self.log(format!("scroll:{direction}:{pixels}"));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        self.log("screenshot".to_string());
        Ok(b"\x89PNG".to_vec())
    }

    async fn accessibility_tree(&self) -> Result<String, PageError> {
        self.log("ariaTree".to_string());
        let url = self.url();
        Ok(format!("RootWebArea \"{url}\"\n  button \"Submit\""))
    }

    async fn wait(&self, duration: Duration) -> Result<(), PageError> {
        self.log(format!("wait:{}", duration.as_millis()));
        Ok(())
    }

    async fn go_back(&self) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let Some(previous) = state.history.pop() else {
            return Err(PageError::new("no history entry to go back to"));
        };
        state.url = previous;
        state.operations.push("navback".to_string());
        Ok(())
    }
}
