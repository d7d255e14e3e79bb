//! Filesystem cache backend.
//!
//! Layout under the cache directory:
//!
//! ```text
//! entries/<entry key>.entry
//! snapshots/<snapshot id>.snap
//! ```
//!
//! Each file is one JSON header line followed by the raw content bytes.
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written entry.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, ClearScope};
use super::hash::{content_hash, entry_key};
use super::snapshots::{Snapshot, SnapshotInfo, is_snapshot_id};
use super::store::CacheStore;
use crate::Error;
use crate::config::CacheBackend;
use crate::driver::DriverKind;

const ENTRY_EXT: &str = "entry";
const SNAPSHOT_EXT: &str = "snap";

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    session: String,
    url: String,
    content_hash: String,
    fetch_time: DateTime<Utc>,
    change_time: Option<DateTime<Utc>>,
    change_count: u64,
    driver_used: DriverKind,
}

/// Cache stored as plain files; survives restarts.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a cache directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join("entries")).await?;
        tokio::fs::create_dir_all(root.join("snapshots")).await?;
        Ok(Self { root })
    }

    fn entry_path(&self, session: &str, url: &str) -> PathBuf {
        self.root
            .join("entries")
            .join(format!("{}.{ENTRY_EXT}", entry_key(session, url)))
    }

    /// Path a snapshot id is stored at.
    pub fn snapshot_path(&self, id: &str) -> PathBuf {
        self.root.join("snapshots").join(format!("{id}.{SNAPSHOT_EXT}"))
    }

    async fn read_entry_file(path: &Path) -> Result<Option<(EntryHeader, Bytes)>, Error> {
        let Some((header, content)) = read_record::<EntryHeader>(path).await? else {
            return Ok(None);
        };
        if content_hash(&content) != header.content_hash {
            return Err(Error::Corrupt(format!("content hash mismatch in {}", path.display())));
        }
        Ok(Some((header, content)))
    }

    async fn files_with_ext(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|e| e == ext) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait::async_trait]
impl CacheStore for FileStore {
    fn backend(&self) -> CacheBackend {
        CacheBackend::Filesystem
    }

    async fn get(&self, session: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let path = self.entry_path(session, url);
        Ok(Self::read_entry_file(&path).await?.map(|(header, content)| CacheEntry {
            content,
            content_hash: header.content_hash,
            fetch_time: header.fetch_time,
            change_time: header.change_time,
            change_count: header.change_count,
            driver_used: header.driver_used,
        }))
    }

    async fn put(&self, session: &str, url: &str, entry: &CacheEntry) -> Result<(), Error> {
        let header = EntryHeader {
            session: session.to_string(),
            url: url.to_string(),
            content_hash: entry.content_hash.clone(),
            fetch_time: entry.fetch_time,
            change_time: entry.change_time,
            change_count: entry.change_count,
            driver_used: entry.driver_used,
        };
        write_record(&self.entry_path(session, url), &header, &entry.content).await
    }

    async fn clear(&self, scope: &ClearScope) -> Result<u64, Error> {
        if let (Some(url), Some(session)) = (&scope.url, &scope.session) {
            return Ok(remove_if_exists(&self.entry_path(session, url)).await? as u64);
        }

        let mut deleted = 0;
        for path in Self::files_with_ext(&self.root.join("entries"), ENTRY_EXT).await? {
            let matched = match read_record::<EntryHeader>(&path).await {
                Ok(Some((header, _))) => scope.matches(&header.session, &header.url),
                Ok(None) => false,
                // Unreadable files only go on a full wipe.
                Err(_) => scope.is_all(),
            };
            if matched && remove_if_exists(&path).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let path = self.snapshot_path(&snapshot.info.id);
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::InvalidInput(format!("snapshot {} already exists", snapshot.info.id)));
        }
        write_record(&path, &snapshot.info, &snapshot.content).await
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>, Error> {
        if !is_snapshot_id(id) {
            return Ok(None);
        }
        Ok(read_record::<SnapshotInfo>(&self.snapshot_path(id))
            .await?
            .map(|(info, content)| Snapshot { info, content }))
    }

    async fn list_snapshots(&self, session: &str, url: &str) -> Result<Vec<SnapshotInfo>, Error> {
        let prefix = format!("{}-v", entry_key(session, url));
        let mut infos = Vec::new();
        for path in Self::files_with_ext(&self.root.join("snapshots"), SNAPSHOT_EXT).await? {
            let named_for_key = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if !named_for_key {
                continue;
            }
            if let Some((info, _)) = read_record::<SnapshotInfo>(&path).await?
                && info.session == session
                && info.url == url
            {
                infos.push(info);
            }
        }
        infos.sort_by_key(|info| info.version);
        Ok(infos)
    }
}

async fn read_record<H: DeserializeOwned>(path: &Path) -> Result<Option<(H, Bytes)>, Error> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let split = raw
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| Error::Corrupt(format!("missing header in {}", path.display())))?;
    let header = serde_json::from_slice(&raw[..split])?;
    let content = Bytes::copy_from_slice(&raw[split + 1..]);
    Ok(Some((header, content)))
}

async fn write_record<H: Serialize>(path: &Path, header: &H, content: &[u8]) -> Result<(), Error> {
    let mut buf = serde_json::to_vec(header)?;
    buf.push(b'\n');
    buf.extend_from_slice(content);

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &buf).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool, Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
