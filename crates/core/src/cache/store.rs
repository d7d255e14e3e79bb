//! Pluggable cache storage.

use std::sync::Arc;

use super::entry::{CacheEntry, ClearScope};
use super::snapshots::{Snapshot, SnapshotInfo};
use super::{CacheDb, FileStore, MemoryStore};
use crate::Error;
use crate::config::{AppConfig, CacheBackend};

/// Storage for cache entries and snapshots.
///
/// Implementations must give read-after-write consistency within a process
/// and replace entries atomically: a reader sees either the old entry or the
/// new one, never a mix.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> CacheBackend;

    async fn get(&self, session: &str, url: &str) -> Result<Option<CacheEntry>, Error>;

    async fn put(&self, session: &str, url: &str, entry: &CacheEntry) -> Result<(), Error>;

    /// Remove entries inside `scope`, returning how many were removed.
    async fn clear(&self, scope: &ClearScope) -> Result<u64, Error>;

    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error>;

    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>, Error>;

    /// Snapshots of one (session, url), ordered by version.
    async fn list_snapshots(&self, session: &str, url: &str) -> Result<Vec<SnapshotInfo>, Error>;
}

/// Open the backend selected by `config`.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn CacheStore>, Error> {
    let store: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::Filesystem => Arc::new(FileStore::open(&config.cache_dir).await?),
        CacheBackend::Sqlite => {
            tokio::fs::create_dir_all(&config.cache_dir).await?;
            Arc::new(CacheDb::open(config.db_path()).await?)
        }
    };

    tracing::info!(backend = %config.cache_backend, location = %config.cache_dir.display(), "opened cache store");

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        for backend in [CacheBackend::Memory, CacheBackend::Filesystem, CacheBackend::Sqlite] {
            let config = AppConfig { cache_backend: backend, cache_dir: dir.path().join("cache"), ..Default::default() };
            let store = open_store(&config).await.unwrap();
            assert_eq!(store.backend(), backend);
        }
        assert!(dir.path().join("cache").join("pulso.sqlite").exists());
    }
}
