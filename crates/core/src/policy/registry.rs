//! Domain policy registry.
//!
//! Pattern forms:
//! - `example.com` matches the host itself and any subdomain
//! - `*.example.com` matches subdomains only
//! - `*` is the default policy
//!
//! Resolution picks exact host equality first, then the longest matching
//! suffix, then the default.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use url::Url;

use super::{DomainPolicy, DomainSpec};
use crate::config::ConfigError;

/// Process-wide mapping from domain pattern to policy.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: RwLock<HashMap<String, DomainPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `spec` and store it under `pattern`, replacing any previous policy.
    pub fn register(&self, pattern: &str, spec: DomainSpec) -> Result<DomainPolicy, ConfigError> {
        let (pattern, policy) = compile_policy(pattern, spec)?;
        self.insert_all(vec![(pattern, policy.clone())]);
        Ok(policy)
    }

    /// Store already validated policies under one write lock.
    pub(crate) fn insert_all(&self, compiled: Vec<(String, DomainPolicy)>) {
        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        for (pattern, policy) in compiled {
            tracing::debug!(
                pattern = %pattern,
                ttl_seconds = policy.ttl_seconds(),
                driver = %policy.driver,
                replaced = policies.contains_key(&pattern),
                "registered domain policy"
            );
            policies.insert(pattern, policy);
        }
    }

    /// Resolve the policy for a URL's host.
    pub fn resolve(&self, url: &Url) -> Result<DomainPolicy, ConfigError> {
        let host = url.host_str().ok_or_else(|| ConfigError::NoPolicy(url.to_string()))?;
        self.resolve_host(host)
    }

    /// Resolve the most specific policy for `host`.
    pub fn resolve_host(&self, host: &str) -> Result<DomainPolicy, ConfigError> {
        let host = host.to_ascii_lowercase();
        let policies = self.policies.read().unwrap_or_else(PoisonError::into_inner);

        policies
            .iter()
            .filter_map(|(pattern, policy)| specificity(&host, pattern).map(|score| (score, policy)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, policy)| policy.clone())
            .ok_or_else(|| ConfigError::NoPolicy(host.clone()))
    }

    /// Snapshot of every registered policy, keyed by pattern.
    pub fn list_all(&self) -> BTreeMap<String, DomainPolicy> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(pattern, policy)| (pattern.clone(), policy.clone()))
            .collect()
    }
}

/// Whether `host` falls under `pattern`.
pub fn domain_matches(host: &str, pattern: &str) -> bool {
    specificity(&host.to_ascii_lowercase(), &pattern.trim().to_ascii_lowercase()).is_some()
}

/// Normalize `pattern` and validate `spec` without registering anything.
pub fn compile_policy(pattern: &str, spec: DomainSpec) -> Result<(String, DomainPolicy), ConfigError> {
    Ok((normalize_pattern(pattern)?, DomainPolicy::try_from(spec)?))
}

fn normalize_pattern(pattern: &str) -> Result<String, ConfigError> {
    let normalized = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
    let base = normalized.strip_prefix("*.").unwrap_or(&normalized);

    let valid = normalized == "*"
        || (!base.is_empty()
            && !base.contains('*')
            && base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_'));

    if !valid {
        return Err(ConfigError::Invalid {
            field: "domain".into(),
            reason: format!("{pattern:?} is not a host, *.suffix or * pattern"),
        });
    }

    Ok(normalized)
}

/// Match score of `pattern` against `host`; higher is more specific.
fn specificity(host: &str, pattern: &str) -> Option<usize> {
    if pattern == "*" {
        return Some(0);
    }
    if let Some(base) = pattern.strip_prefix("*.") {
        return is_subdomain(host, base).then(|| base.len() * 2 + 1);
    }
    if host == pattern {
        return Some(usize::MAX);
    }
    is_subdomain(host, pattern).then(|| pattern.len() * 2)
}

fn is_subdomain(host: &str, base: &str) -> bool {
    host.len() > base.len() && host.ends_with(base) && host.as_bytes()[host.len() - base.len() - 1] == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(patterns: &[(&str, &str)]) -> PolicyRegistry {
        let registry = PolicyRegistry::new();
        for (pattern, ttl) in patterns {
            registry.register(pattern, DomainSpec::new(*ttl)).unwrap();
        }
        registry
    }

    fn ttl_for(registry: &PolicyRegistry, host: &str) -> u64 {
        registry.resolve_host(host).unwrap().ttl_seconds()
    }

    #[test]
    fn test_exact_and_suffix_match() {
        let registry = registry_with(&[("example.com", "1h")]);
        assert_eq!(ttl_for(&registry, "example.com"), 3600);
        assert_eq!(ttl_for(&registry, "news.example.com"), 3600);
        assert!(matches!(registry.resolve_host("badexample.com"), Err(ConfigError::NoPolicy(_))));
    }

    #[test]
    fn test_most_specific_wins() {
        let registry = registry_with(&[("*", "1s"), ("example.com", "1m"), ("*.example.com", "2m"), ("api.example.com", "1h")]);
        assert_eq!(ttl_for(&registry, "api.example.com"), 3600);
        assert_eq!(ttl_for(&registry, "v2.api.example.com"), 3600);
        assert_eq!(ttl_for(&registry, "www.example.com"), 120);
        assert_eq!(ttl_for(&registry, "example.com"), 60);
        assert_eq!(ttl_for(&registry, "other.org"), 1);
    }

    #[test]
    fn test_wildcard_excludes_apex() {
        let registry = registry_with(&[("*.example.com", "1m")]);
        assert!(registry.resolve_host("example.com").is_err());
        assert!(registry.resolve_host("a.example.com").is_ok());
    }

    #[test]
    fn test_reregistration_overwrites() {
        let registry = registry_with(&[("example.com", "1h"), ("EXAMPLE.com", "5m")]);
        assert_eq!(registry.list_all().len(), 1);
        assert_eq!(ttl_for(&registry, "example.com"), 300);
    }

    #[test]
    fn test_resolve_url() {
        let registry = registry_with(&[("example.com", "12h")]);
        let url = Url::parse("https://www.example.com/path").unwrap();
        assert_eq!(registry.resolve(&url).unwrap().ttl_seconds(), 43_200);
    }

    #[test]
    fn test_rejects_bad_patterns() {
        let registry = PolicyRegistry::new();
        for bad in ["", "https://example.com", "ex*ample.com", "a b.com", "*.*.com"] {
            assert!(registry.register(bad, DomainSpec::new("1h")).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_invalid_spec_not_stored() {
        let registry = PolicyRegistry::new();
        assert!(registry.register("example.com", DomainSpec::new("nope")).is_err());
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("example.com", "example.com"));
        assert!(domain_matches("a.example.com", "example.com"));
        assert!(!domain_matches("example.com", "*.example.com"));
        assert!(domain_matches("anything.net", "*"));
        assert!(!domain_matches("example.org", "example.com"));
    }
}
