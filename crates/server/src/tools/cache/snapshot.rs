//! cache_snapshot and cache_snapshot_get tool implementations.
//!
//! Snapshots copy the current cache entry under a new version and outlive
//! TTL expiry and cache clears.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pulso_core::{Engine, Error, SnapshotInfo};

use crate::tools::{json_result, timestamp};

/// Parameters for the cache_snapshot tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSnapshotParams {
    /// The cached URL to snapshot.
    pub url: String,

    /// Cache session; defaults to the server's current session.
    #[serde(default)]
    pub session: Option<String>,
}

/// Parameters for the cache_snapshot_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSnapshotGetParams {
    /// Snapshot id returned by cache_snapshot.
    pub id: String,
}

/// Snapshot metadata as shown to tool callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotView {
    pub id: String,
    pub session: String,
    pub url: String,
    pub version: u32,
    pub content_hash: String,
    /// ISO8601 fetch time of the entry the snapshot was taken from.
    pub fetch_time: String,
    /// ISO8601 time the snapshot was taken.
    pub taken_at: String,
    pub size: u64,
}

impl From<&SnapshotInfo> for SnapshotView {
    fn from(info: &SnapshotInfo) -> Self {
        Self {
            id: info.id.clone(),
            session: info.session.clone(),
            url: info.url.clone(),
            version: info.version,
            content_hash: info.content_hash.clone(),
            fetch_time: timestamp(&info.fetch_time),
            taken_at: timestamp(&info.taken_at),
            size: info.size,
        }
    }
}

/// Output from the cache_snapshot tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSnapshotOutput {
    pub url: String,
    /// New snapshot id; absent when nothing was cached.
    pub id: Option<String>,
}

/// Output from the cache_snapshot_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSnapshotGetOutput {
    pub snapshot: SnapshotView,
    /// Snapshot content decoded as UTF-8 (invalid sequences replaced).
    pub content: String,
}

pub(crate) async fn snapshot_output(engine: &Engine, params: CacheSnapshotParams) -> Result<CacheSnapshotOutput, Error> {
    let id = engine.snapshot(&params.url, params.session.as_deref()).await?;
    Ok(CacheSnapshotOutput { url: params.url, id })
}

pub(crate) async fn snapshot_get_output(
    engine: &Engine, params: CacheSnapshotGetParams,
) -> Result<CacheSnapshotGetOutput, Error> {
    let snapshot = engine
        .read_snapshot(&params.id)
        .await?
        .ok_or_else(|| Error::CacheMiss(params.id.clone()))?;

    Ok(CacheSnapshotGetOutput {
        snapshot: SnapshotView::from(&snapshot.info),
        content: String::from_utf8_lossy(&snapshot.content).into_owned(),
    })
}

/// Implementation of the cache_snapshot tool.
pub async fn snapshot_impl(engine: &Engine, params: CacheSnapshotParams) -> Result<CallToolResult, McpError> {
    let output = snapshot_output(engine, params).await?;
    json_result(&output)
}

/// Implementation of the cache_snapshot_get tool.
pub async fn snapshot_get_impl(engine: &Engine, params: CacheSnapshotGetParams) -> Result<CallToolResult, McpError> {
    let output = snapshot_get_output(engine, params).await?;
    json_result(&output)
}
