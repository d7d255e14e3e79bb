//! Simple HTTP driver.
//!
//! One GET per call, no script execution:
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Non-2xx statuses are content failures, transport errors are network failures
//!
//! Retries and the per-attempt deadline belong to the engine; the client
//! timeout here is only a backstop.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Client, header};
use url::Url;

use pulso_core::driver::charset_from_content_type;
use pulso_core::{AppConfig, DriverError, DriverKind, DriverResponse, Error, FetchDriver};

/// Configuration for the HTTP driver.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "pulso/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "pulso/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Self::default()
        }
    }
}

/// The `simple-http` driver.
#[derive(Debug, Clone)]
pub struct HttpDriver {
    http: Client,
    config: FetchConfig,
}

impl HttpDriver {
    /// Create a new driver with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(FetchConfig::from(config))
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, size: usize) -> DriverError {
        DriverError::TooLarge { size: size as u64, limit: self.config.max_bytes as u64 }
    }
}

#[async_trait::async_trait]
impl FetchDriver for HttpDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::SimpleHttp
    }

    async fn fetch(&self, url: &Url) -> Result<DriverResponse, DriverError> {
        let start = Instant::now();

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| DriverError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::Status { code: status.as_u16() });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes: Bytes = response
            .bytes()
            .await
            .map_err(|e| DriverError::Network(format!("failed to read response: {e}")))?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len()));
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(url = %url, final_url = %final_url, elapsed_ms, size = bytes.len(), "http fetch");

        Ok(DriverResponse {
            charset: content_type.as_deref().and_then(charset_from_content_type),
            bytes,
            final_url,
            status: Some(status.as_u16()),
            content_type,
            elapsed_ms,
        })
    }
}
