//! Core engine for pulso.
//!
//! This crate provides:
//! - Domain policy registry (TTL, driver, retry and fallback rules)
//! - Session manager for cache isolation
//! - Cache store trait with memory, filesystem and SQLite backends
//! - Versioned snapshots
//! - Fetch driver interface and the fetch orchestrator
//! - Unified error types and layered configuration

pub mod cache;
pub mod canonical;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod policy;
pub mod session;

pub use cache::{CacheDb, CacheEntry, CacheStore, ClearScope, EntryMetadata, FileStore, MemoryStore, Snapshot, SnapshotInfo};
pub use config::{AppConfig, CacheBackend, ConfigError};
pub use driver::{DriverError, DriverKind, DriverResponse, DriverSet, FetchDriver};
pub use engine::{Engine, FetchOptions};
pub use error::Error;
pub use policy::{DomainPolicy, DomainSpec, ErrorHook, FallbackMode, PolicyRegistry};
pub use session::{DEFAULT_SESSION, SessionManager};
