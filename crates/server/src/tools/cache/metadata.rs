//! cache_metadata tool implementation.
//!
//! Change-tracking metadata and snapshot history for one cached URL.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{Engine, EntryMetadata, Error};

use super::snapshot::SnapshotView;
use crate::tools::{json_result, timestamp};

/// Parameters for the cache_metadata tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMetadataParams {
    /// The URL to look up.
    pub url: String,

    /// Cache session; defaults to the server's current session.
    #[serde(default)]
    pub session: Option<String>,
}

/// Entry metadata as shown to tool callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MetadataView {
    /// SHA-256 of the content, hex encoded.
    pub content_hash: String,
    /// ISO8601 time of the last successful fetch.
    pub fetch_time: String,
    /// ISO8601 time of the last content change, if any.
    pub change_time: Option<String>,
    pub change_count: u64,
    /// Driver that produced the content.
    pub driver_used: String,
    pub size: u64,
}

impl From<&EntryMetadata> for MetadataView {
    fn from(meta: &EntryMetadata) -> Self {
        Self {
            content_hash: meta.content_hash.clone(),
            fetch_time: timestamp(&meta.fetch_time),
            change_time: meta.change_time.as_ref().map(timestamp),
            change_count: meta.change_count,
            driver_used: meta.driver_used.to_string(),
            size: meta.size,
        }
    }
}

/// Output from the cache_metadata tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMetadataOutput {
    pub url: String,
    /// Absent when nothing is cached for the URL.
    pub metadata: Option<MetadataView>,
    /// Snapshots of the URL, oldest first.
    pub snapshots: Vec<SnapshotView>,
}

pub(crate) async fn metadata_output(engine: &Engine, params: CacheMetadataParams) -> Result<CacheMetadataOutput, Error> {
    let session = params.session.as_deref();
    let metadata = engine.get_metadata(&params.url, session).await?;
    let snapshots = engine.list_snapshots(&params.url, session).await?;

    Ok(CacheMetadataOutput {
        url: params.url,
        metadata: metadata.as_ref().map(MetadataView::from),
        snapshots: snapshots.iter().map(SnapshotView::from).collect(),
    })
}

/// Implementation of the cache_metadata tool.
pub async fn metadata_impl(engine: &Engine, params: CacheMetadataParams) -> Result<CallToolResult, McpError> {
    let output = metadata_output(engine, params).await?;
    json_result(&output)
}
