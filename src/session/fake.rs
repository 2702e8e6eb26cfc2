//! Scripted in-memory session for exercising the agent state machine and the
//! worker pool without a browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{SessionError, SessionFactory, WebSession};
use crate::agent::selectors;

/// How a fake session behaves for a given username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Full happy path through confirmation.
    BookingSucceeds,
    /// No signed-in marker appears after submitting credentials.
    LoginRejected,
    /// The requested slot button never appears in the search results.
    SlotMissing,
    /// Checkout goes through but no confirmation prompt is shown.
    ConfirmationMissing,
    /// Never finishes loading the first page; used for timeout coverage.
    Hangs,
}

struct Inner {
    scripts: HashMap<String, Script>,
    default_script: Script,
    launch_fails: bool,
    step_delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Shared factory handing out scripted sessions. Tracks live-session counts
/// so tests can assert release and concurrency bounds.
pub struct FakeFactory {
    inner: Arc<Inner>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                scripts: HashMap::new(),
                default_script: Script::BookingSucceeds,
                launch_fails: false,
                step_delay: Duration::ZERO,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Every `connect` fails, as when no browser binary is installed.
    pub fn launch_fails() -> Self {
        let mut factory = Self::new();
        Arc::get_mut(&mut factory.inner).unwrap().launch_fails = true;
        factory
    }

    pub fn with_script(mut self, username: &str, script: Script) -> Self {
        Arc::get_mut(&mut self.inner)
            .unwrap()
            .scripts
            .insert(username.to_string(), script);
        self
    }

    /// Behavior for usernames with no explicit script.
    pub fn with_default_script(mut self, script: Script) -> Self {
        Arc::get_mut(&mut self.inner).unwrap().default_script = script;
        self
    }

    /// Artificial page-load delay, for observing concurrency.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        Arc::get_mut(&mut self.inner).unwrap().step_delay = delay;
        self
    }

    /// Sessions currently alive (connected and not yet dropped).
    pub fn open_sessions(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive sessions observed.
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn connect(&self, _headless: bool) -> Result<Box<dyn WebSession>, SessionError> {
        if self.inner.launch_fails {
            return Err(SessionError::Launch("no chromium binary".to_string()));
        }
        let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            inner: self.inner.clone(),
            script: self.inner.default_script,
        }))
    }
}

struct FakeSession {
    inner: Arc<Inner>,
    script: Script,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WebSession for FakeSession {
    async fn open(&mut self, _url: &str) -> Result<(), SessionError> {
        if self.script == Script::Hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.inner.step_delay.is_zero() {
            tokio::time::sleep(self.inner.step_delay).await;
        }
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), SessionError> {
        if selector == selectors::LOGIN_USERNAME {
            if let Some(script) = self.inner.scripts.get(value) {
                self.script = *script;
            }
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), SessionError> {
        if self.script == Script::Hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if selector.contains("cart-button") && self.script == Script::SlotMissing {
            return Err(SessionError::WaitTimeout {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    async fn read_text(&mut self, selector: &str) -> Result<Option<String>, SessionError> {
        let text = match selector {
            selectors::RESUME_SESSION => None,
            selectors::ACCOUNT_MENU => match self.script {
                Script::LoginRejected => None,
                _ => Some("# member".to_string()),
            },
            selectors::CONFIRMATION_HEADER => match self.script {
                Script::ConfirmationMissing => None,
                _ => Some("Booking Confirmation".to_string()),
            },
            _ => Some(String::new()),
        };
        Ok(text)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        Ok(b"\x89PNG-fake".to_vec())
    }

    async fn close(&mut self) {}
}
