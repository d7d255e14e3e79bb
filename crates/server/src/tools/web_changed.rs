//! web_changed tool implementation.
//!
//! Reports whether the most recent fetch of a URL changed its content.
//! Reads recorded state only; call web_fetch first to refresh it.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{Engine, Error};

use super::json_result;

/// Input parameters for web_changed tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebChangedParams {
    /// The URL to check.
    pub url: String,

    /// Cache session; defaults to the server's current session.
    #[serde(default)]
    pub session: Option<String>,
}

/// Output structure for web_changed tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebChangedOutput {
    pub url: String,
    pub changed: bool,
    /// Total changes observed, if the URL is cached.
    pub change_count: Option<u64>,
}

pub(crate) async fn changed_output(engine: &Engine, params: WebChangedParams) -> Result<WebChangedOutput, Error> {
    let session = params.session.as_deref();
    let changed = engine.has_changed(&params.url, session).await?;
    let metadata = engine.get_metadata(&params.url, session).await?;

    Ok(WebChangedOutput { url: params.url, changed, change_count: metadata.map(|m| m.change_count) })
}

/// Implementation of the web_changed tool.
pub async fn changed_impl(engine: &Engine, params: WebChangedParams) -> Result<CallToolResult, McpError> {
    let output = changed_output(engine, params).await?;
    json_result(&output)
}
