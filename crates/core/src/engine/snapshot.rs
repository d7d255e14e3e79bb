use chrono::Utc;

use super::Engine;
use crate::Error;
use crate::cache::Snapshot;

impl Engine {
    /// Persist a copy of the cached content for `url` as a new version.
    ///
    /// Returns the snapshot id, or `None` when nothing is cached. Never fetches.
    pub async fn snapshot(&self, url: &str, session: Option<&str>) -> Result<Option<String>, Error> {
        let (session, url) = self.key(url, session)?;
        let key = url.as_str();

        let _guard = self.locks.acquire(&session, key).await;
        let store = self.store();
        let Some(entry) = store.get(&session, key).await? else {
            tracing::debug!(url = %key, session = %session, "nothing cached to snapshot");
            return Ok(None);
        };

        let version = store
            .list_snapshots(&session, key)
            .await?
            .last()
            .map_or(1, |info| info.version + 1);
        let snapshot = Snapshot::capture(&session, key, &entry, version, Utc::now());
        store.put_snapshot(&snapshot).await?;

        tracing::info!(url = %key, session = %session, id = %snapshot.info.id, version, "took snapshot");
        Ok(Some(snapshot.info.id))
    }
}
