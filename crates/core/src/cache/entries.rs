//! Entry storage for the SQLite backend.

use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::entry::{CacheEntry, ClearScope, format_timestamp, parse_timestamp};
use super::snapshots::{Snapshot, SnapshotInfo};
use super::store::CacheStore;
use crate::Error;
use crate::canonical::host_of;
use crate::config::{CacheBackend, ConfigError};
use crate::policy::domain_matches;

struct EntryRow {
    content: Vec<u8>,
    content_hash: String,
    fetch_time: String,
    change_time: Option<String>,
    change_count: i64,
    driver_used: String,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry, Error> {
        Ok(CacheEntry {
            content: Bytes::from(self.content),
            content_hash: self.content_hash,
            fetch_time: parse_timestamp(&self.fetch_time)?,
            change_time: self.change_time.as_deref().map(parse_timestamp).transpose()?,
            change_count: u64::try_from(self.change_count).map_err(|e| Error::Corrupt(e.to_string()))?,
            driver_used: self
                .driver_used
                .parse()
                .map_err(|e: ConfigError| Error::Corrupt(e.to_string()))?,
        })
    }
}

#[async_trait::async_trait]
impl CacheStore for CacheDb {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Sqlite
    }

    async fn get(&self, session: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let session = session.to_string();
        let url = url.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT content, content_hash, fetch_time, change_time, change_count, driver_used
                     FROM entries WHERE session = ?1 AND url = ?2",
                )?;

                let result = stmt.query_row(params![session, url], |row| {
                    Ok(EntryRow {
                        content: row.get(0)?,
                        content_hash: row.get(1)?,
                        fetch_time: row.get(2)?,
                        change_time: row.get(3)?,
                        change_count: row.get(4)?,
                        driver_used: row.get(5)?,
                    })
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(EntryRow::into_entry).transpose()
    }

    /// Insert or replace the entry in a single statement.
    async fn put(&self, session: &str, url: &str, entry: &CacheEntry) -> Result<(), Error> {
        let session = session.to_string();
        let url = url.to_string();
        let host = host_of(&url).unwrap_or_default();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                        session, url, host, content, content_hash,
                        fetch_time, change_time, change_count, driver_used
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(session, url) DO UPDATE SET
                        host = excluded.host,
                        content = excluded.content,
                        content_hash = excluded.content_hash,
                        fetch_time = excluded.fetch_time,
                        change_time = excluded.change_time,
                        change_count = excluded.change_count,
                        driver_used = excluded.driver_used",
                    params![
                        session,
                        url,
                        host,
                        entry.content.to_vec(),
                        entry.content_hash,
                        format_timestamp(&entry.fetch_time),
                        entry.change_time.as_ref().map(format_timestamp),
                        entry.change_count as i64,
                        entry.driver_used.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn clear(&self, scope: &ClearScope) -> Result<u64, Error> {
        let scope = scope.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let deleted = match (&scope.url, &scope.domain, &scope.session) {
                    (Some(url), _, Some(session)) => conn.execute(
                        "DELETE FROM entries WHERE session = ?1 AND url = ?2",
                        params![session, url],
                    )?,
                    (Some(url), _, None) => conn.execute("DELETE FROM entries WHERE url = ?1", params![url])?,
                    (None, Some(pattern), session) => {
                        let tx = conn.transaction()?;
                        let keys = {
                            let mut stmt = tx.prepare("SELECT session, url, host FROM entries")?;
                            let rows = stmt
                                .query_map([], |row| {
                                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                                })?
                                .collect::<Result<Vec<_>, _>>()?;
                            rows
                        };

                        let mut deleted = 0;
                        {
                            let mut delete = tx.prepare("DELETE FROM entries WHERE session = ?1 AND url = ?2")?;
                            for (s, u, host) in &keys {
                                let in_session = session.as_deref().is_none_or(|target| target == s.as_str());
                                if in_session && domain_matches(host, pattern) {
                                    deleted += delete.execute(params![s, u])?;
                                }
                            }
                        }
                        tx.commit()?;
                        deleted
                    }
                    (None, None, Some(session)) => {
                        conn.execute("DELETE FROM entries WHERE session = ?1", params![session])?
                    }
                    (None, None, None) => conn.execute("DELETE FROM entries", [])?,
                };
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        self.insert_snapshot(snapshot).await
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>, Error> {
        self.select_snapshot(id).await
    }

    async fn list_snapshots(&self, session: &str, url: &str) -> Result<Vec<SnapshotInfo>, Error> {
        self.select_snapshot_infos(session, url).await
    }
}
