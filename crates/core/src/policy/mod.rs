//! Domain policies: how a host is fetched and how long its content stays fresh.
//!
//! Registration input arrives as a loosely typed [`DomainSpec`] (strings for
//! TTL, driver and fallback, as in config files) and is parsed into a
//! [`DomainPolicy`] immediately, so bad values fail at registration time.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::driver::{DriverError, DriverKind};

mod duration;
mod registry;

pub use duration::parse_ttl;
pub use registry::{PolicyRegistry, compile_policy, domain_matches};

/// What `fetch` does once every attempt has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    /// Serve the last good entry, or nothing when there is none.
    #[default]
    ReturnCached,
    /// Return an empty result.
    ReturnNone,
    /// Fail with `Error::Fetch`.
    RaiseError,
}

impl FallbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::ReturnCached => "return_cached",
            FallbackMode::ReturnNone => "return_none",
            FallbackMode::RaiseError => "raise_error",
        }
    }
}

impl fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "return_cached" => Ok(FallbackMode::ReturnCached),
            "return_none" => Ok(FallbackMode::ReturnNone),
            "raise_error" => Ok(FallbackMode::RaiseError),
            other => Err(ConfigError::UnknownFallback(other.to_string())),
        }
    }
}

/// Callback invoked with `(url, error)` after every failed attempt.
#[derive(Clone)]
pub struct ErrorHook(Arc<dyn Fn(&str, &DriverError) + Send + Sync>);

impl ErrorHook {
    pub fn new(f: impl Fn(&str, &DriverError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the hook. Returns `false` if it panicked.
    pub fn notify(&self, url: &str, err: &DriverError) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.0)(url, err))).is_ok()
    }
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHook(..)")
    }
}

/// Registration input for a domain, mirroring the config file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Duration expression such as `"12h"`.
    pub ttl: String,

    #[serde(default = "default_driver")]
    pub driver: String,

    #[serde(default)]
    pub max_retries: u32,

    /// Seconds to wait between attempts.
    #[serde(default)]
    pub retry_delay: f64,

    #[serde(default = "default_fallback")]
    pub fallback_on_error: String,

    #[serde(skip)]
    pub on_error: Option<ErrorHook>,
}

fn default_driver() -> String {
    DriverKind::SimpleHttp.as_str().into()
}

fn default_fallback() -> String {
    FallbackMode::ReturnCached.as_str().into()
}

impl DomainSpec {
    pub fn new(ttl: impl Into<String>) -> Self {
        Self {
            ttl: ttl.into(),
            driver: default_driver(),
            max_retries: 0,
            retry_delay: 0.0,
            fallback_on_error: default_fallback(),
            on_error: None,
        }
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, seconds: f64) -> Self {
        self.retry_delay = seconds;
        self
    }

    pub fn fallback_on_error(mut self, mode: impl Into<String>) -> Self {
        self.fallback_on_error = mode.into();
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&str, &DriverError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(ErrorHook::new(hook));
        self
    }
}

/// A validated domain policy.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    pub ttl: Duration,
    pub driver: DriverKind,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub fallback: FallbackMode,
    pub on_error: Option<ErrorHook>,
}

impl DomainPolicy {
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Total driver calls a fetch cycle may make.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether content fetched at `fetched_at` is still within the TTL at `now`.
    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = (now - fetched_at).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }
}

impl TryFrom<DomainSpec> for DomainPolicy {
    type Error = ConfigError;

    fn try_from(spec: DomainSpec) -> Result<Self, Self::Error> {
        let ttl = parse_ttl(&spec.ttl)?;
        let driver = spec.driver.parse()?;
        let fallback = spec.fallback_on_error.parse()?;

        let retry_delay = Duration::try_from_secs_f64(spec.retry_delay).map_err(|_| ConfigError::Invalid {
            field: "retry_delay".into(),
            reason: format!("must be a non-negative, representable number of seconds, got {}", spec.retry_delay),
        })?;

        Ok(Self {
            ttl,
            driver,
            max_retries: spec.max_retries,
            retry_delay,
            fallback,
            on_error: spec.on_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_domain_spec_defaults() {
        let policy = DomainPolicy::try_from(DomainSpec::new("1h")).unwrap();
        assert_eq!(policy.ttl_seconds(), 3600);
        assert_eq!(policy.driver, DriverKind::SimpleHttp);
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.retry_delay, Duration::ZERO);
        assert_eq!(policy.fallback, FallbackMode::ReturnCached);
        assert!(policy.on_error.is_none());
    }

    #[test]
    fn test_domain_spec_all_fields() {
        let spec = DomainSpec::new("6h")
            .driver("playwright")
            .max_retries(5)
            .retry_delay(2.0)
            .fallback_on_error("raise_error")
            .on_error(|_, _| {});
        let policy = DomainPolicy::try_from(spec).unwrap();
        assert_eq!(policy.driver, DriverKind::RenderedBrowser);
        assert_eq!(policy.attempts(), 6);
        assert_eq!(policy.retry_delay, Duration::from_secs(2));
        assert_eq!(policy.fallback, FallbackMode::RaiseError);
        assert!(policy.on_error.is_some());
    }

    #[test]
    fn test_domain_spec_rejects_bad_values() {
        let bad_fallback = DomainSpec::new("1h").fallback_on_error("retry_forever");
        assert!(matches!(DomainPolicy::try_from(bad_fallback), Err(ConfigError::UnknownFallback(_))));

        let bad_driver = DomainSpec::new("1h").driver("telnet");
        assert!(matches!(DomainPolicy::try_from(bad_driver), Err(ConfigError::UnknownDriver(_))));

        for delay in [-1.0, f64::NAN, f64::INFINITY, 1e20] {
            let bad_delay = DomainSpec::new("1h").retry_delay(delay);
            assert!(
                matches!(DomainPolicy::try_from(bad_delay), Err(ConfigError::Invalid { ref field, .. }) if field == "retry_delay"),
                "retry_delay {delay} accepted"
            );
        }

        let bad_ttl = DomainSpec::new("later");
        assert!(matches!(DomainPolicy::try_from(bad_ttl), Err(ConfigError::InvalidTtl(_))));
    }

    #[test]
    fn test_is_fresh() {
        let policy = DomainPolicy::try_from(DomainSpec::new("60s")).unwrap();
        let fetched = Utc::now();
        assert!(policy.is_fresh(fetched, fetched + chrono::Duration::seconds(59)));
        assert!(!policy.is_fresh(fetched, fetched + chrono::Duration::seconds(60)));
        assert!(policy.is_fresh(fetched, fetched - chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_error_hook_survives_panic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let hook = ErrorHook::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            panic!("reporter exploded");
        });

        assert!(!hook.notify("https://example.com/", &DriverError::Timeout(10)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
