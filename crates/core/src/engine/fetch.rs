//! The fetch cycle: freshness check, driver attempts, fallback.

use bytes::Bytes;
use chrono::Utc;
use url::Url;

use super::{Engine, canonical_url};
use crate::Error;
use crate::cache::CacheEntry;
use crate::driver::{DriverError, DriverResponse};
use crate::policy::{DomainPolicy, FallbackMode};

/// Per-call fetch arguments.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Skip the freshness check and always call the driver.
    pub force: bool,
    /// Session to read and write under; `None` uses the engine's current one.
    pub session: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session = Some(id.into());
        self
    }
}

impl Engine {
    /// Return content for `url`, from cache while fresh, otherwise from the
    /// domain's driver.
    ///
    /// `Ok(None)` means every attempt failed and the fallback produced
    /// nothing. `Error::Fetch` is returned only under `raise_error`.
    pub async fn fetch(&self, url: &str, opts: FetchOptions) -> Result<Option<Bytes>, Error> {
        Ok(self.fetch_entry(url, opts).await?.map(|entry| entry.content))
    }

    /// [`Engine::fetch`] returning the entry the content was served from, so
    /// callers see metadata that belongs to that exact content.
    pub async fn fetch_entry(&self, url: &str, opts: FetchOptions) -> Result<Option<CacheEntry>, Error> {
        let url = canonical_url(url)?;
        let policy = self.registry.resolve(&url)?;
        let session = self.sessions.resolve(opts.session.as_deref())?;
        let key = url.as_str();

        let _guard = self.locks.acquire(&session, key).await;
        let store = self.store();
        let cached = store.get(&session, key).await?;

        if !opts.force
            && let Some(entry) = &cached
            && policy.is_fresh(entry.fetch_time, Utc::now())
        {
            tracing::debug!(url = %key, session = %session, "cache hit");
            return Ok(Some(entry.clone()));
        }

        let response = match self.attempt_all(&url, &policy).await {
            Ok(response) => response,
            Err(last) => return fall_back(key, &policy, cached, last),
        };

        let now = Utc::now();
        let entry = match &cached {
            Some(previous) => previous.refreshed(response.bytes, policy.driver, now),
            None => CacheEntry::first(response.bytes, policy.driver, now),
        };
        store.put(&session, key, &entry).await?;

        if entry.changed_on_last_fetch() {
            tracing::info!(
                url = %key,
                session = %session,
                change_count = entry.change_count,
                hash = %entry.content_hash,
                "content changed"
            );
        } else {
            tracing::info!(url = %key, session = %session, size = entry.content.len(), "stored entry");
        }

        Ok(Some(entry))
    }

    /// Call the policy's driver up to `max_retries + 1` times.
    ///
    /// Returns the last failure once attempts are exhausted.
    async fn attempt_all(&self, url: &Url, policy: &DomainPolicy) -> Result<DriverResponse, DriverError> {
        let attempts = policy.attempts();
        let timeout = self.timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match self.drivers.get(policy.driver) {
                Ok(driver) => match tokio::time::timeout(timeout, driver.fetch(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(DriverError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))),
                },
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(response) => {
                    tracing::debug!(
                        url = %url,
                        driver = %policy.driver,
                        attempt,
                        elapsed_ms = response.elapsed_ms,
                        "driver fetch succeeded"
                    );
                    return Ok(response);
                }
                Err(err) => err,
            };

            tracing::warn!(
                url = %url,
                driver = %policy.driver,
                attempt,
                attempts,
                content_failure = err.is_content_failure(),
                error = %err,
                "fetch attempt failed"
            );

            if let Some(hook) = &policy.on_error
                && !hook.notify(url.as_str(), &err)
            {
                tracing::warn!(url = %url, "on_error hook panicked");
            }

            if attempt >= attempts {
                return Err(err);
            }
            if !policy.retry_delay.is_zero() {
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
    }
}

/// Apply the policy's fallback after every attempt failed.
///
/// A cached entry is served untouched: no fetch time or change bookkeeping.
fn fall_back(
    url: &str, policy: &DomainPolicy, cached: Option<CacheEntry>, last: DriverError,
) -> Result<Option<CacheEntry>, Error> {
    match policy.fallback {
        FallbackMode::ReturnCached => {
            tracing::warn!(url = %url, serving_cached = cached.is_some(), error = %last, "fetch failed, falling back");
            Ok(cached)
        }
        FallbackMode::ReturnNone => {
            tracing::warn!(url = %url, error = %last, "fetch failed, returning nothing");
            Ok(None)
        }
        FallbackMode::RaiseError => Err(Error::Fetch { url: url.to_string(), source: last }),
    }
}
