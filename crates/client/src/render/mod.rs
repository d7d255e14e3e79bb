//! Rendered-browser driver for script-heavy pages.
//!
//! Uses chromiumoxide to drive a headless Chrome/Chromium. The browser is
//! launched on first use and shared by every later fetch.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

use pulso_core::{DriverError, DriverKind, DriverResponse, FetchDriver};

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Wait selector not found.
    #[error("wait_for selector not found: {0}")]
    SelectorNotFound(String),
}

impl From<RenderError> for DriverError {
    fn from(err: RenderError) -> Self {
        DriverError::Render(err.to_string())
    }
}

/// Options for rendering a page.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Time to let scripts settle when no selector is given (default: 2000).
    pub settle_ms: u64,

    /// Optional CSS selector to wait for before reading content.
    pub wait_for: Option<String>,

    /// Viewport dimensions (default: 1280x720).
    pub viewport: (u32, u32),
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { settle_ms: 2000, wait_for: None, viewport: (1280, 720) }
    }
}

/// An open tab, closed when dropped.
///
/// Dropping covers every exit from a render, including the fetch future
/// being cancelled by a timeout.
struct OpenPage(Page);

impl Drop for OpenPage {
    fn drop(&mut self) {
        let page = self.0.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        tracing::debug!("closing page failed: {e}");
                    }
                });
            }
            Err(_) => tracing::debug!("no runtime to close page on"),
        }
    }
}

/// The `rendered-browser` driver.
pub struct BrowserDriver {
    browser: OnceCell<Browser>,
    opts: RenderOptions,
}

impl BrowserDriver {
    pub fn new(opts: RenderOptions) -> Self {
        Self { browser: OnceCell::new(), opts }
    }

    async fn browser(&self) -> Result<&Browser, RenderError> {
        self.browser.get_or_try_init(|| launch(self.opts.viewport)).await
    }

    async fn render(&self, url: &Url) -> Result<(String, Url), RenderError> {
        // Open blank first so the guard owns the tab before navigation starts.
        let tab = OpenPage(
            self.browser()
                .await?
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?,
        );
        let page = &tab.0;
        page.goto(url.as_str())
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        match &self.opts.wait_for {
            Some(selector) => {
                let mut found = false;
                for _ in 0..30 {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        found = true;
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                if !found {
                    return Err(RenderError::SelectorNotFound(selector.clone()));
                }
            }
            None => tokio::time::sleep(Duration::from_millis(self.opts.settle_ms)).await,
        }

        let html = page
            .content()
            .await
            .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

        let page_url = page
            .url()
            .await
            .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;

        let final_url = Url::parse(page_url.as_deref().unwrap_or(url.as_str()))
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        Ok((html, final_url))
    }
}

impl Default for BrowserDriver {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

/// Launch a headless browser and drive its CDP event loop in the background.
async fn launch(viewport: (u32, u32)) -> Result<Browser, RenderError> {
    let config = BrowserConfig::builder()
        .window_size(viewport.0, viewport.1)
        .build()
        .map_err(RenderError::BrowserLaunch)?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
    });

    tracing::info!("launched headless browser");
    Ok(browser)
}

#[async_trait::async_trait]
impl FetchDriver for BrowserDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::RenderedBrowser
    }

    async fn fetch(&self, url: &Url) -> Result<DriverResponse, DriverError> {
        let start = Instant::now();
        let (html, final_url) = self.render(url).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(url = %url, final_url = %final_url, elapsed_ms, size = html.len(), "rendered page");

        Ok(DriverResponse {
            bytes: Bytes::from(html),
            final_url,
            status: None,
            content_type: Some("text/html; charset=utf-8".into()),
            charset: Some("utf-8".into()),
            elapsed_ms,
        })
    }
}
