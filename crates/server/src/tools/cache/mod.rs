//! Cache-related MCP tools.
//!
//! Metadata lookup, snapshots and clearing.

pub mod clear;
pub mod metadata;
pub mod snapshot;

pub use clear::{CacheClearParams, clear_impl};
pub use metadata::{CacheMetadataParams, MetadataView, metadata_impl};
pub use snapshot::{CacheSnapshotGetParams, CacheSnapshotParams, SnapshotView, snapshot_get_impl, snapshot_impl};
