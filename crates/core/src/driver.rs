//! Fetch driver interface.
//!
//! Drivers perform the actual retrieval. The orchestrator treats them as
//! plain request/response calls and owns retries and timeouts itself.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// Which driver produces a domain's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    /// Direct request/response, no script execution.
    SimpleHttp,
    /// Headless browser; page scripts run before content is read.
    RenderedBrowser,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::SimpleHttp => "simple-http",
            DriverKind::RenderedBrowser => "rendered-browser",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple-http" | "http" | "requests" => Ok(DriverKind::SimpleHttp),
            "rendered-browser" | "browser" | "playwright" => Ok(DriverKind::RenderedBrowser),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

/// A failed driver call. Never surfaced directly to callers of `fetch`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// Connection, DNS or TLS failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("status {code}")]
    Status { code: u16 },

    /// The attempt exceeded the orchestrator's timeout.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The body exceeded the configured byte limit.
    #[error("{size} bytes exceeds {limit}")]
    TooLarge { size: u64, limit: u64 },

    /// Browser launch, navigation or content retrieval failed.
    #[error("render failed: {0}")]
    Render(String),

    /// No driver of this kind is installed.
    #[error("driver unavailable: {0}")]
    Unavailable(DriverKind),
}

impl DriverError {
    /// True when the server was reached but the content was unusable.
    pub fn is_content_failure(&self) -> bool {
        matches!(self, DriverError::Status { .. } | DriverError::TooLarge { .. })
    }
}

/// Successful driver output.
#[derive(Debug, Clone)]
pub struct DriverResponse {
    /// Raw body bytes.
    pub bytes: Bytes,
    /// Final URL after redirects.
    pub final_url: Url,
    /// HTTP status, when the driver knows it.
    pub status: Option<u16>,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Charset taken from the Content-Type, if any.
    pub charset: Option<String>,
    /// Time spent in the driver.
    pub elapsed_ms: u64,
}

/// Capability that retrieves a URL's content.
#[async_trait::async_trait]
pub trait FetchDriver: Send + Sync {
    /// Which policy driver value this implementation serves.
    fn kind(&self) -> DriverKind;

    /// Retrieve the URL.
    async fn fetch(&self, url: &Url) -> Result<DriverResponse, DriverError>;
}

/// Installed drivers, one per kind.
#[derive(Clone, Default)]
pub struct DriverSet {
    simple_http: Option<Arc<dyn FetchDriver>>,
    rendered_browser: Option<Arc<dyn FetchDriver>>,
}

impl DriverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a driver under its own kind, replacing any previous one.
    pub fn with(mut self, driver: Arc<dyn FetchDriver>) -> Self {
        match driver.kind() {
            DriverKind::SimpleHttp => self.simple_http = Some(driver),
            DriverKind::RenderedBrowser => self.rendered_browser = Some(driver),
        }
        self
    }

    pub fn get(&self, kind: DriverKind) -> Result<Arc<dyn FetchDriver>, DriverError> {
        let slot = match kind {
            DriverKind::SimpleHttp => &self.simple_http,
            DriverKind::RenderedBrowser => &self.rendered_browser,
        };
        slot.clone().ok_or(DriverError::Unavailable(kind))
    }

    pub fn available(&self) -> Vec<DriverKind> {
        [DriverKind::SimpleHttp, DriverKind::RenderedBrowser]
            .into_iter()
            .filter(|kind| self.get(*kind).is_ok())
            .collect()
    }
}

impl fmt::Debug for DriverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSet").field("available", &self.available()).finish()
    }
}

/// Extract the charset parameter from a Content-Type value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}
