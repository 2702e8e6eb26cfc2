//! Browser session abstraction.
//!
//! The submission agent drives a site through this narrow capability set
//! (open, fill, click, read, screenshot, close) so its state machine can be
//! exercised against a scripted fake. The real implementation rides on
//! chromiumoxide in [`chrome`].

pub mod chrome;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("timed out waiting for {selector}")]
    WaitTimeout { selector: String },

    #[error("interaction with {selector} failed: {reason}")]
    Interaction { selector: String, reason: String },

    #[error("screenshot capture failed: {0}")]
    Screenshot(String),
}

/// One live browser session. All waits are internal to the session and never
/// block sibling sessions.
#[async_trait]
pub trait WebSession: Send {
    /// Navigate to a URL and wait for the page to settle.
    async fn open(&mut self, url: &str) -> Result<(), SessionError>;

    /// Wait for the element at `selector` and type `value` into it.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), SessionError>;

    /// Wait for the element at `selector` and click it.
    async fn click(&mut self, selector: &str) -> Result<(), SessionError>;

    /// Read the text of the element at `selector`, or `None` when it never
    /// appears within the wait budget. Absence is a state, not an error.
    async fn read_text(&mut self, selector: &str) -> Result<Option<String>, SessionError>;

    /// Capture a full-page screenshot as PNG bytes.
    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError>;

    /// Tear the session down. Called on every agent exit path.
    async fn close(&mut self);
}

/// Creates sessions for agents. One factory is shared across the worker pool;
/// each agent gets its own session.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self, headless: bool) -> Result<Box<dyn WebSession>, SessionError>;
}
