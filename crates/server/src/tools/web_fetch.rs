//! web_fetch tool implementation.
//!
//! Returns content for a URL, from cache while fresh, otherwise through the
//! domain's driver with its retry and fallback rules.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{Engine, Error, FetchOptions};

use super::cache::MetadataView;
use super::json_result;

/// Input parameters for web_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebFetchParams {
    /// The URL to fetch.
    pub url: String,

    /// Bypass the freshness check and always call the driver.
    #[serde(default)]
    pub force: bool,

    /// Cache session; defaults to the server's current session.
    #[serde(default)]
    pub session: Option<String>,
}

/// Output structure for web_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebFetchOutput {
    /// The URL requested.
    pub url: String,
    /// Session the content was read or stored under.
    pub session: String,
    /// False when every attempt failed and nothing was cached.
    pub found: bool,
    /// Content decoded as UTF-8 (invalid sequences replaced).
    pub content: Option<String>,
    /// Content size in bytes.
    pub size: usize,
    /// Metadata of the entry the content was served from.
    pub metadata: Option<MetadataView>,
}

pub(crate) async fn fetch_output(engine: &Engine, params: WebFetchParams) -> Result<WebFetchOutput, Error> {
    let session = match params.session {
        Some(session) => session,
        None => engine.get_session(),
    };
    let opts = FetchOptions::new().force(params.force).session(session.clone());

    let entry = engine.fetch_entry(&params.url, opts).await?;

    Ok(WebFetchOutput {
        url: params.url,
        session,
        found: entry.is_some(),
        size: entry.as_ref().map_or(0, |e| e.content.len()),
        metadata: entry.as_ref().map(|e| MetadataView::from(&e.metadata())),
        content: entry.map(|e| String::from_utf8_lossy(&e.content).into_owned()),
    })
}

/// Implementation of the web_fetch tool.
pub async fn fetch_impl(engine: &Engine, params: WebFetchParams) -> Result<CallToolResult, McpError> {
    let output = fetch_output(engine, params).await?;
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_engine;
    use pulso_core::DomainSpec;
    use pulso_core::cache::hash::content_hash;
    use std::sync::atomic::Ordering;

    fn params(url: &str) -> WebFetchParams {
        WebFetchParams { url: url.to_string(), force: false, session: None }
    }

    #[tokio::test]
    async fn test_fetch_then_cached() {
        let (engine, driver) = test_engine();
        engine.register_domain("example.com", DomainSpec::new("1h")).unwrap();

        let first = fetch_output(&engine, params("https://example.com/")).await.unwrap();
        let second = fetch_output(&engine, params("https://example.com/")).await.unwrap();

        assert!(first.found);
        assert_eq!(first.session, "default");
        assert_eq!(first.content.as_deref(), Some("<body>1</body>"));
        assert_eq!(second.content, first.content);
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.metadata.unwrap().change_count, 0);
    }

    #[tokio::test]
    async fn test_force_records_change() {
        let (engine, _) = test_engine();
        engine.register_domain("example.com", DomainSpec::new("1h")).unwrap();

        fetch_output(&engine, params("https://example.com/")).await.unwrap();
        let forced = fetch_output(&engine, WebFetchParams { force: true, ..params("https://example.com/") })
            .await
            .unwrap();

        let metadata = forced.metadata.unwrap();
        assert_eq!(metadata.change_count, 1);
        assert!(metadata.change_time.is_some());
    }

    #[tokio::test]
    async fn test_metadata_describes_returned_content() {
        let (engine, _) = test_engine();
        engine.register_domain("example.com", DomainSpec::new("1h")).unwrap();

        for _ in 0..3 {
            let output = fetch_output(&engine, WebFetchParams { force: true, ..params("https://example.com/") })
                .await
                .unwrap();
            let content = output.content.unwrap();
            let metadata = output.metadata.unwrap();
            assert_eq!(metadata.content_hash, content_hash(content.as_bytes()));
            assert_eq!(metadata.size, content.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_not_found() {
        let (engine, _) = test_engine();
        engine
            .register_domain("example.com", DomainSpec::new("1h").fallback_on_error("return_none"))
            .unwrap();

        let output = fetch_output(&engine, params("https://example.com/down")).await.unwrap();
        assert!(!output.found);
        assert!(output.content.is_none());
        assert!(output.metadata.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_domain_errors() {
        let (engine, _) = test_engine();
        let err = fetch_impl(&engine, params("https://example.com/")).await.unwrap_err();
        assert_eq!(err.code.0, -32000);
    }
}
