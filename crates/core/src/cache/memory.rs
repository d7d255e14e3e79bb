//! In-process cache backend.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use super::entry::{CacheEntry, ClearScope};
use super::snapshots::{Snapshot, SnapshotInfo};
use super::store::CacheStore;
use crate::Error;
use crate::config::CacheBackend;

/// Cache kept in process memory; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
    snapshots: RwLock<BTreeMap<String, Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Memory
    }

    async fn get(&self, session: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(session.to_string(), url.to_string())).cloned())
    }

    async fn put(&self, session: &str, url: &str, entry: &CacheEntry) -> Result<(), Error> {
        self.entries
            .write()
            .await
            .insert((session.to_string(), url.to_string()), entry.clone());
        Ok(())
    }

    async fn clear(&self, scope: &ClearScope) -> Result<u64, Error> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(session, url), _| !scope.matches(session, url));
        Ok((before - entries.len()) as u64)
    }

    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let mut snapshots = self.snapshots.write().await;
        if snapshots.contains_key(&snapshot.info.id) {
            return Err(Error::InvalidInput(format!("snapshot {} already exists", snapshot.info.id)));
        }
        snapshots.insert(snapshot.info.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>, Error> {
        Ok(self.snapshots.read().await.get(id).cloned())
    }

    async fn list_snapshots(&self, session: &str, url: &str) -> Result<Vec<SnapshotInfo>, Error> {
        let snapshots = self.snapshots.read().await;
        let mut infos: Vec<SnapshotInfo> = snapshots
            .values()
            .filter(|s| s.info.session == session && s.info.url == url)
            .map(|s| s.info.clone())
            .collect();
        infos.sort_by_key(|info| info.version);
        Ok(infos)
    }
}
