//! Chromium-backed session via the Chrome DevTools Protocol.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{SessionError, SessionFactory, WebSession};

/// How long to wait for an element before giving up, mirroring the site's
/// slowest observed page transitions.
const ELEMENT_WAIT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches one Chromium instance per agent session.
pub struct ChromeFactory;

#[async_trait]
impl SessionFactory for ChromeFactory {
    async fn connect(&self, headless: bool) -> Result<Box<dyn WebSession>, SessionError> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--start-maximized");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while its event stream is
        // polled.
        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(SessionError::Launch(e.to_string()));
            }
        };

        debug!(headless, "browser session started");
        Ok(Box::new(ChromeSession {
            browser,
            page: Some(page),
            handler_task,
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: tokio::task::JoinHandle<()>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, SessionError> {
        self.page.as_ref().ok_or_else(|| SessionError::Launch(
            "session already closed".to_string(),
        ))
    }

    /// Poll for an element until it appears or the wait budget runs out.
    async fn wait_for(&self, selector: &str) -> Result<Element, SessionError> {
        let page = self.page()?;
        let deadline = Instant::now() + ELEMENT_WAIT;
        loop {
            match page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(SessionError::WaitTimeout {
                        selector: selector.to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl WebSession for ChromeSession {
    async fn open(&mut self, url: &str) -> Result<(), SessionError> {
        let page = self.page()?;
        page.goto(url).await.map_err(|e| SessionError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        page.wait_for_navigation()
            .await
            .map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), SessionError> {
        let element = self.wait_for(selector).await?;
        element.click().await.map_err(|e| SessionError::Interaction {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        element
            .type_str(value)
            .await
            .map_err(|e| SessionError::Interaction {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), SessionError> {
        let element = self.wait_for(selector).await?;
        element.click().await.map_err(|e| SessionError::Interaction {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn read_text(&mut self, selector: &str) -> Result<Option<String>, SessionError> {
        match self.wait_for(selector).await {
            Ok(element) => {
                let text = element
                    .inner_text()
                    .await
                    .map_err(|e| SessionError::Interaction {
                        selector: selector.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(text.unwrap_or_default()))
            }
            Err(SessionError::WaitTimeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        let page = self.page()?;
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
        )
        .await
        .map_err(|e| SessionError::Screenshot(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close page");
            }
        }
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "failed to close browser");
        }
        self.handler_task.abort();
        debug!("browser session closed");
    }
}

// A timed-out agent is dropped mid-flight without reaching close(); aborting
// the handler here severs the CDP connection so Chromium exits.
impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
