//! Cache entries and change tracking.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hash::content_hash;
use crate::Error;
use crate::canonical::host_of;
use crate::driver::DriverKind;
use crate::policy::domain_matches;

/// Last successfully fetched content for a (session, url).
///
/// `content` and `content_hash` are only ever set together through the
/// constructors below.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub content: Bytes,
    pub content_hash: String,
    pub fetch_time: DateTime<Utc>,
    /// When the hash last changed; `None` until a change is observed.
    pub change_time: Option<DateTime<Utc>>,
    pub change_count: u64,
    pub driver_used: DriverKind,
}

impl CacheEntry {
    /// Entry for a URL fetched for the first time.
    pub fn first(content: Bytes, driver: DriverKind, now: DateTime<Utc>) -> Self {
        Self {
            content_hash: content_hash(&content),
            content,
            fetch_time: now,
            change_time: None,
            change_count: 0,
            driver_used: driver,
        }
    }

    /// Entry replacing `self` after a successful refetch.
    pub fn refreshed(&self, content: Bytes, driver: DriverKind, now: DateTime<Utc>) -> Self {
        let hash = content_hash(&content);
        let changed = hash != self.content_hash;
        Self {
            content,
            content_hash: hash,
            fetch_time: now,
            change_time: if changed { Some(now) } else { self.change_time },
            change_count: if changed { self.change_count + 1 } else { self.change_count },
            driver_used: driver,
        }
    }

    /// Whether the most recent successful fetch changed the content.
    pub fn changed_on_last_fetch(&self) -> bool {
        self.change_time == Some(self.fetch_time)
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            content_hash: self.content_hash.clone(),
            fetch_time: self.fetch_time,
            change_time: self.change_time,
            change_count: self.change_count,
            driver_used: self.driver_used,
            size: self.content.len() as u64,
        }
    }
}

/// Change-tracking view of an entry, without content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub content_hash: String,
    pub fetch_time: DateTime<Utc>,
    pub change_time: Option<DateTime<Utc>>,
    pub change_count: u64,
    pub driver_used: DriverKind,
    pub size: u64,
}

/// Which entries a `clear` call removes.
///
/// `url` takes precedence over `domain`; `session` narrows either. The
/// engine fills in its current session when none is named, unless
/// `all_sessions` is set. A store given a scope without a session matches
/// every session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearScope {
    pub session: Option<String>,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub all_sessions: bool,
}

impl ClearScope {
    /// Every entry of one session (the current one unless narrowed).
    pub fn all() -> Self {
        Self::default()
    }

    /// Every entry of every session.
    pub fn all_sessions() -> Self {
        Self { all_sessions: true, ..Self::default() }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Self::default() }
    }

    pub fn domain(pattern: impl Into<String>) -> Self {
        Self { domain: Some(pattern.into()), ..Self::default() }
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self { session: Some(id.into()), ..Self::default() }
    }

    pub fn in_session(mut self, id: impl Into<String>) -> Self {
        self.session = Some(id.into());
        self.all_sessions = false;
        self
    }

    pub fn across_sessions(mut self) -> Self {
        self.session = None;
        self.all_sessions = true;
        self
    }

    pub fn is_all(&self) -> bool {
        self.session.is_none() && self.url.is_none() && self.domain.is_none()
    }

    /// Whether the stored (session, url) falls inside this scope.
    pub fn matches(&self, session: &str, url: &str) -> bool {
        if self.session.as_deref().is_some_and(|s| s != session) {
            return false;
        }
        match (&self.url, &self.domain) {
            (Some(target), _) => target == url,
            (None, Some(pattern)) => host_of(url).is_some_and(|host| domain_matches(&host, pattern)),
            (None, None) => true,
        }
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_entry() {
        let now = Utc::now();
        let entry = CacheEntry::first(Bytes::from_static(b"A"), DriverKind::SimpleHttp, now);
        assert_eq!(entry.change_count, 0);
        assert_eq!(entry.change_time, None);
        assert_eq!(entry.content_hash, content_hash(b"A"));
        assert!(!entry.changed_on_last_fetch());
    }

    #[test]
    fn test_refresh_same_content_keeps_counters() {
        let t0 = Utc::now();
        let entry = CacheEntry::first(Bytes::from_static(b"A"), DriverKind::SimpleHttp, t0);
        let next = entry.refreshed(Bytes::from_static(b"A"), DriverKind::SimpleHttp, t0 + Duration::seconds(5));
        assert_eq!(next.change_count, 0);
        assert_eq!(next.change_time, None);
        assert_eq!(next.fetch_time, t0 + Duration::seconds(5));
        assert!(!next.changed_on_last_fetch());
    }

    #[test]
    fn test_refresh_a_a_b_counts_once() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let t2 = t0 + Duration::seconds(2);
        let entry = CacheEntry::first(Bytes::from_static(b"A"), DriverKind::SimpleHttp, t0)
            .refreshed(Bytes::from_static(b"A"), DriverKind::SimpleHttp, t1)
            .refreshed(Bytes::from_static(b"B"), DriverKind::SimpleHttp, t2);
        assert_eq!(entry.change_count, 1);
        assert_eq!(entry.change_time, Some(t2));
        assert!(entry.changed_on_last_fetch());

        let settled = entry.refreshed(Bytes::from_static(b"B"), DriverKind::SimpleHttp, t2 + Duration::seconds(1));
        assert_eq!(settled.change_count, 1);
        assert!(!settled.changed_on_last_fetch());
    }

    #[test]
    fn test_clear_scope_matching() {
        let url = "https://news.example.com/a";
        assert!(ClearScope::all().matches("s1", url));
        assert!(ClearScope::session("s1").matches("s1", url));
        assert!(!ClearScope::session("s2").matches("s1", url));
        assert!(ClearScope::url(url).matches("s1", url));
        assert!(!ClearScope::url("https://example.com/").matches("s1", url));
        assert!(ClearScope::domain("example.com").matches("s1", url));
        assert!(!ClearScope::domain("other.com").matches("s1", url));
        assert!(!ClearScope::domain("example.com").in_session("s2").matches("s1", url));
    }

    #[test]
    fn test_session_and_all_sessions_exclude_each_other() {
        let spanning = ClearScope::url("https://a.com/").in_session("s").across_sessions();
        assert!(spanning.all_sessions);
        assert!(spanning.session.is_none());

        let narrowed = ClearScope::all_sessions().in_session("s");
        assert!(!narrowed.all_sessions);
        assert_eq!(narrowed.session.as_deref(), Some("s"));
    }

    #[test]
    fn test_url_takes_precedence_over_domain() {
        let scope = ClearScope { url: Some("https://a.com/".into()), domain: Some("b.com".into()), ..ClearScope::default() };
        assert!(scope.matches("s", "https://a.com/"));
        assert!(!scope.matches("s", "https://b.com/"));
    }

    #[test]
    fn test_timestamp_roundtrip_is_exact() {
        let now = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(&now)).unwrap(), now);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
