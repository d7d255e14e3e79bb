//! The fetch engine.
//!
//! [`Engine`] ties the policy registry, session manager, cache store and
//! drivers together. Every operation takes an optional explicit session and
//! falls back to the engine's current one.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use url::Url;

use crate::Error;
use crate::cache::{CacheStore, ClearScope, EntryMetadata, Snapshot, SnapshotInfo, open_store};
use crate::canonical::canonicalize;
use crate::config::{AppConfig, CacheBackend};
use crate::driver::DriverSet;
use crate::policy::{DomainPolicy, DomainSpec, PolicyRegistry, compile_policy};
use crate::session::SessionManager;

mod fetch;
mod locks;
mod snapshot;

pub use fetch::FetchOptions;
use locks::KeyLocks;

/// Content fetch-and-cache engine.
pub struct Engine {
    registry: PolicyRegistry,
    sessions: SessionManager,
    store: RwLock<Arc<dyn CacheStore>>,
    drivers: DriverSet,
    locks: KeyLocks,
    config: RwLock<AppConfig>,
}

impl Engine {
    /// Engine over an already opened store, with default settings.
    pub fn new(store: Arc<dyn CacheStore>, drivers: DriverSet) -> Self {
        let config = AppConfig { cache_backend: store.backend(), ..AppConfig::default() };
        Self {
            registry: PolicyRegistry::new(),
            sessions: SessionManager::new(config.session_id.clone()),
            store: RwLock::new(store),
            drivers,
            locks: KeyLocks::new(),
            config: RwLock::new(config),
        }
    }

    /// Open the configured store and register the configured domains.
    pub async fn from_config(config: AppConfig, drivers: DriverSet) -> Result<Self, Error> {
        let store = open_store(&config).await?;
        let engine = Self::new(store, drivers);
        engine.apply_config(config).await?;
        Ok(engine)
    }

    /// Reload configuration from the environment and an optional TOML file.
    pub async fn load_config(&self, path: Option<&Path>) -> Result<(), Error> {
        let config = AppConfig::load_from(path)?;
        self.apply_config(config).await
    }

    /// Make `config` the engine's configuration.
    ///
    /// The store is reopened only when the backend or its location changed.
    /// Configured domains are registered over existing ones; domains
    /// registered at runtime are kept. Nothing changes unless the whole
    /// configuration is accepted.
    pub async fn apply_config(&self, config: AppConfig) -> Result<(), Error> {
        config.validate()?;
        let policies = config
            .domains
            .iter()
            .map(|(pattern, spec)| compile_policy(pattern, spec.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let session = self.sessions.resolve(Some(&config.session_id))?;

        let current = self.config();
        let backend_changed = self.store().backend() != config.cache_backend;
        let location_changed =
            config.cache_backend != CacheBackend::Memory && current.cache_dir != config.cache_dir;
        let reopened = if backend_changed || location_changed { Some(open_store(&config).await?) } else { None };

        if let Some(store) = reopened {
            *self.store.write().unwrap_or_else(PoisonError::into_inner) = store;
        }
        self.registry.insert_all(policies);
        self.sessions.set(&session)?;

        tracing::info!(
            backend = %config.cache_backend,
            session = %config.session_id,
            domains = config.domains.len(),
            timeout_ms = config.timeout_ms,
            "applied configuration"
        );

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Override the per-attempt fetch timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.config.write().unwrap_or_else(PoisonError::into_inner).timeout_ms = millis;
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.config.read().unwrap_or_else(PoisonError::into_inner).timeout()
    }

    pub(crate) fn store(&self) -> Arc<dyn CacheStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Register or replace the policy for a domain pattern.
    pub fn register_domain(&self, pattern: &str, spec: DomainSpec) -> Result<DomainPolicy, Error> {
        Ok(self.registry.register(pattern, spec)?)
    }

    /// All registered policies, keyed by pattern.
    pub fn registered_domains(&self) -> BTreeMap<String, DomainPolicy> {
        self.registry.list_all()
    }

    /// Policy that applies to `url`.
    pub fn resolve_policy(&self, url: &str) -> Result<DomainPolicy, Error> {
        let url = canonical_url(url)?;
        Ok(self.registry.resolve(&url)?)
    }

    pub fn set_session(&self, id: &str) -> Result<(), Error> {
        Ok(self.sessions.set(id)?)
    }

    pub fn get_session(&self) -> String {
        self.sessions.get()
    }

    /// Whether the most recent fetch of `url` changed its content.
    ///
    /// Reads recorded state only; it never fetches. `false` when nothing is
    /// cached.
    pub async fn has_changed(&self, url: &str, session: Option<&str>) -> Result<bool, Error> {
        let (session, url) = self.key(url, session)?;
        let entry = self.store().get(&session, url.as_str()).await?;
        Ok(entry.is_some_and(|e| e.changed_on_last_fetch()))
    }

    /// Change-tracking metadata for `url`, or `None` when nothing is cached.
    pub async fn get_metadata(&self, url: &str, session: Option<&str>) -> Result<Option<EntryMetadata>, Error> {
        let (session, url) = self.key(url, session)?;
        let entry = self.store().get(&session, url.as_str()).await?;
        Ok(entry.map(|e| e.metadata()))
    }

    pub async fn read_snapshot(&self, id: &str) -> Result<Option<Snapshot>, Error> {
        self.store().get_snapshot(id).await
    }

    /// Snapshots taken of `url`, oldest first.
    pub async fn list_snapshots(&self, url: &str, session: Option<&str>) -> Result<Vec<SnapshotInfo>, Error> {
        let (session, url) = self.key(url, session)?;
        self.store().list_snapshots(&session, url.as_str()).await
    }

    /// Remove cache entries inside `scope`; snapshots are kept.
    ///
    /// A scope without a session applies to the current session unless it
    /// asks for all sessions. A single-key clear waits for that key's fetch
    /// in flight; broader clears wait for every key.
    pub async fn clear(&self, mut scope: ClearScope) -> Result<u64, Error> {
        if let Some(url) = scope.url.take() {
            scope.url = Some(canonical_url(&url)?.into());
        }
        if let Some(pattern) = scope.domain.take() {
            scope.domain = Some(pattern.trim().to_ascii_lowercase());
        }
        scope.session = if scope.all_sessions {
            None
        } else {
            Some(self.sessions.resolve(scope.session.as_deref())?)
        };

        let removed = match (&scope.url, &scope.session) {
            (Some(url), Some(session)) => {
                let _guard = self.locks.acquire(session, url).await;
                self.store().clear(&scope).await?
            }
            _ => {
                let _guard = self.locks.exclusive().await;
                self.store().clear(&scope).await?
            }
        };

        tracing::info!(
            session = scope.session.as_deref(),
            url = scope.url.as_deref(),
            domain = scope.domain.as_deref(),
            all_sessions = scope.all_sessions,
            removed,
            "cleared cache entries"
        );
        Ok(removed)
    }

    /// Resolve the (session, canonical url) cache key.
    fn key(&self, url: &str, session: Option<&str>) -> Result<(String, Url), Error> {
        let url = canonical_url(url)?;
        let session = self.sessions.resolve(session)?;
        Ok((session, url))
    }
}

fn canonical_url(url: &str) -> Result<Url, Error> {
    canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use crate::driver::{DriverError, DriverKind, DriverResponse, FetchDriver};

    use super::*;

    /// Driver that replays scripted outcomes and counts calls.
    ///
    /// Once the script runs out the last outcome repeats.
    pub(crate) struct ScriptedDriver {
        kind: DriverKind,
        script: Mutex<VecDeque<Result<&'static [u8], DriverError>>>,
        last: Mutex<Option<Result<&'static [u8], DriverError>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedDriver {
        pub(crate) fn new(kind: DriverKind, script: Vec<Result<&'static [u8], DriverError>>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn serving(bodies: &[&'static [u8]]) -> Arc<Self> {
            Self::new(DriverKind::SimpleHttp, bodies.iter().map(|b| Ok(*b)).collect())
        }

        pub(crate) fn failing() -> Arc<Self> {
            Self::new(DriverKind::SimpleHttp, vec![Err(DriverError::Network("connection refused".into()))])
        }

        pub(crate) fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                kind: DriverKind::SimpleHttp,
                script: Mutex::new(vec![Ok(&b"late"[..])].into()),
                last: Mutex::new(None),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl FetchDriver for ScriptedDriver {
        fn kind(&self) -> DriverKind {
            self.kind
        }

        async fn fetch(&self, url: &Url) -> Result<DriverResponse, DriverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let outcome = {
                let mut script = self.script.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                if let Some(next) = script.pop_front() {
                    *last = Some(next);
                }
                last.clone().unwrap_or_else(|| Err(DriverError::Network("empty script".into())))
            };

            outcome.map(|body| DriverResponse {
                bytes: Bytes::from_static(body),
                final_url: url.clone(),
                status: Some(200),
                content_type: Some("text/html".into()),
                charset: None,
                elapsed_ms: 1,
            })
        }
    }

    pub(crate) fn engine_with(driver: Arc<ScriptedDriver>) -> Engine {
        let store: Arc<dyn CacheStore> = Arc::new(crate::cache::MemoryStore::new());
        Engine::new(store, DriverSet::new().with(driver))
    }
}
