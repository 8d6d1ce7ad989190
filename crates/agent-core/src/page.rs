//! Page handle the agent drives.
//!
//! The browser transport lives outside this crate; hosts adapt their CDP
//! session (or anything else) to [`AgentPage`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("page operation failed: {0}")]
pub struct PageError(pub String);

impl PageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[async_trait]
pub trait AgentPage: Send + Sync {
    async fn current_url(&self) -> Result<String, PageError>;

    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// `target` is a selector or a plain-language element description.
    async fn click(&self, target: &str) -> Result<(), PageError>;

    async fn type_text(&self, target: &str, text: &str, submit: bool) -> Result<(), PageError>;

    async fn scroll(&self, direction: ScrollDirection, pixels: u32) -> Result<(), PageError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;

    async fn accessibility_tree(&self) -> Result<String, PageError>;

    async fn wait(&self, duration: Duration) -> Result<(), PageError>;

    async fn go_back(&self) -> Result<(), PageError>;
}

pub type PageHandle = Arc<dyn AgentPage>;
