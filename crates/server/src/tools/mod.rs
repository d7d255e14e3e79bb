//! MCP tool implementations.
//!
//! Each tool has a `*_impl` function taking the engine and its parameters,
//! so the handler stays a thin routing layer.

pub mod cache;
pub mod domains;
pub mod session;
pub mod web_changed;
pub mod web_fetch;

use chrono::{DateTime, SecondsFormat, Utc};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use pulso_core::Error;

pub use cache::{CacheClearParams, CacheMetadataParams, CacheSnapshotGetParams, CacheSnapshotParams};
pub use domains::DomainRegisterParams;
pub use session::SessionSetParams;
pub use web_changed::WebChangedParams;
pub use web_fetch::WebFetchParams;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// ISO8601 timestamp as shown in tool output.
pub(crate) fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
