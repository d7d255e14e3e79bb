//! Versioned snapshots.
//!
//! A snapshot is an immutable copy of an entry's content taken on demand.
//! It outlives TTL expiry and `clear` calls on the entry it came from.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::entry::{CacheEntry, format_timestamp, parse_timestamp};
use super::hash::entry_key;
use crate::Error;

/// Snapshot metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub session: String,
    pub url: String,
    pub version: u32,
    pub content_hash: String,
    /// Fetch time of the entry the snapshot was taken from.
    pub fetch_time: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub size: u64,
}

/// A stored snapshot with its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub info: SnapshotInfo,
    pub content: Bytes,
}

impl Snapshot {
    /// Copy `entry` into version `version` of the (session, url) history.
    pub fn capture(session: &str, url: &str, entry: &CacheEntry, version: u32, taken_at: DateTime<Utc>) -> Self {
        Self {
            info: SnapshotInfo {
                id: snapshot_id(session, url, version),
                session: session.to_string(),
                url: url.to_string(),
                version,
                content_hash: entry.content_hash.clone(),
                fetch_time: entry.fetch_time,
                taken_at,
                size: entry.content.len() as u64,
            },
            content: entry.content.clone(),
        }
    }
}

/// `<entry key>-v<version>`; the full key keeps ids of different keys apart.
pub fn snapshot_id(session: &str, url: &str, version: u32) -> String {
    format!("{}-v{version}", entry_key(session, url))
}

/// Whether `id` has the shape produced by [`snapshot_id`].
pub fn is_snapshot_id(id: &str) -> bool {
    let Some((prefix, version)) = id.split_once("-v") else {
        return false;
    };
    prefix.len() == 64
        && prefix.chars().all(|c| c.is_ascii_hexdigit())
        && !version.is_empty()
        && version.chars().all(|c| c.is_ascii_digit())
}

impl CacheDb {
    /// Insert a snapshot. Snapshots are immutable, so an existing id is an error.
    pub async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let snapshot = snapshot.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let info = &snapshot.info;
                conn.execute(
                    "INSERT INTO snapshots (
                        id, session, url, version, content, content_hash, fetch_time, taken_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        &info.id,
                        &info.session,
                        &info.url,
                        info.version,
                        snapshot.content.to_vec(),
                        &info.content_hash,
                        format_timestamp(&info.fetch_time),
                        format_timestamp(&info.taken_at),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a snapshot by id.
    ///
    /// Returns None if the id doesn't exist.
    pub async fn select_snapshot(&self, id: &str) -> Result<Option<Snapshot>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Snapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, session, url, version, content_hash, fetch_time, taken_at, length(content), content
                     FROM snapshots WHERE id = ?1",
                )?;

                let result = stmt.query_row(params![id], |row| {
                    Ok((SnapshotRow::from_row(row)?, row.get::<_, Vec<u8>>(8)?))
                });

                match result {
                    Ok((row, content)) => Ok(Some(Snapshot { info: row.into_info()?, content: Bytes::from(content) })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Snapshot metadata for one (session, url), oldest version first.
    pub async fn select_snapshot_infos(&self, session: &str, url: &str) -> Result<Vec<SnapshotInfo>, Error> {
        let session = session.to_string();
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<SnapshotInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, session, url, version, content_hash, fetch_time, taken_at, length(content)
                     FROM snapshots WHERE session = ?1 AND url = ?2 ORDER BY version ASC",
                )?;
                let rows = stmt
                    .query_map(params![session, url], SnapshotRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                let infos = rows.into_iter().map(SnapshotRow::into_info).collect::<Result<Vec<_>, _>>()?;
                Ok(infos)
            })
            .await
            .map_err(Error::from)
    }
}

struct SnapshotRow {
    id: String,
    session: String,
    url: String,
    version: u32,
    content_hash: String,
    fetch_time: String,
    taken_at: String,
    size: u64,
}

impl SnapshotRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session: row.get(1)?,
            url: row.get(2)?,
            version: row.get(3)?,
            content_hash: row.get(4)?,
            fetch_time: row.get(5)?,
            taken_at: row.get(6)?,
            size: row.get::<_, i64>(7)? as u64,
        })
    }

    fn into_info(self) -> Result<SnapshotInfo, Error> {
        Ok(SnapshotInfo {
            fetch_time: parse_timestamp(&self.fetch_time)?,
            taken_at: parse_timestamp(&self.taken_at)?,
            id: self.id,
            session: self.session,
            url: self.url,
            version: self.version,
            content_hash: self.content_hash,
            size: self.size,
        })
    }
}
