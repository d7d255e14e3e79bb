//! Cache storage for fetched content.
//!
//! Entries are keyed by (session, canonical url) and carry change-tracking
//! metadata. Three interchangeable backends implement [`CacheStore`]:
//!
//! - [`MemoryStore`]: process-local, gone on restart
//! - [`FileStore`]: one file per entry under a cache directory
//! - [`CacheDb`]: SQLite with WAL mode and schema migrations

pub mod connection;
mod entries;
pub mod entry;
pub mod filesystem;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod snapshots;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entry::{CacheEntry, ClearScope, EntryMetadata};
pub use filesystem::FileStore;
pub use memory::MemoryStore;
pub use snapshots::{Snapshot, SnapshotInfo};
pub use store::{CacheStore, open_store};
