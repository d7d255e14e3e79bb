//! cache_clear tool implementation.
//!
//! Removes cache entries by url, domain or session. Snapshots are kept.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{ClearScope, Engine, Error};

use crate::tools::json_result;

/// Parameters for the cache_clear tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearParams {
    /// Clear this URL only. Takes precedence over `domain`.
    pub url: Option<String>,

    /// Clear entries whose host matches this domain pattern.
    pub domain: Option<String>,

    /// Session to clear in; defaults to the server's current session.
    pub session: Option<String>,

    /// Apply to every session instead of one. With no url or domain this
    /// clears the whole cache.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

pub(crate) async fn clear_output(engine: &Engine, params: CacheClearParams) -> Result<CacheClearOutput, Error> {
    if params.all && params.session.is_some() {
        return Err(Error::InvalidInput("session and all = true are mutually exclusive".to_string()));
    }
    let scope = ClearScope {
        session: params.session,
        url: params.url,
        domain: params.domain,
        all_sessions: params.all,
    };
    if scope.is_all() && !params.all {
        return Err(Error::InvalidInput(
            "At least one of url, domain or session must be specified, or all = true".to_string(),
        ));
    }

    let deleted = engine.clear(scope).await?;
    Ok(CacheClearOutput { deleted })
}

/// Implementation of the cache_clear tool.
pub async fn clear_impl(engine: &Engine, params: CacheClearParams) -> Result<CallToolResult, McpError> {
    let output = clear_output(engine, params).await?;
    json_result(&output)
}
