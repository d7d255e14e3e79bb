//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PULSO_*)
//! 2. TOML config file (explicit path, or PULSO_CONFIG_FILE)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::policy::DomainSpec;
use crate::session::DEFAULT_SESSION;

mod validation;

pub use validation::ConfigError;

/// Where cache entries and snapshots are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process memory; lost on exit.
    Memory,
    /// One file per entry under `cache_dir`.
    Filesystem,
    /// SQLite database under `cache_dir`.
    Sqlite,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Filesystem => "filesystem",
            CacheBackend::Sqlite => "sqlite",
        })
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PULSO_*)
/// 2. TOML config file
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Initial ambient session id.
    ///
    /// Set via PULSO_SESSION_ID environment variable.
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Cache backend kind.
    ///
    /// Set via PULSO_CACHE_BACKEND environment variable.
    #[serde(default = "default_cache_backend")]
    pub cache_backend: CacheBackend,

    /// Storage location for the filesystem and sqlite backends.
    ///
    /// Set via PULSO_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Log filter used by binaries when RUST_LOG is unset.
    ///
    /// Set via PULSO_LOG_LEVEL environment variable.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// User-Agent string for the HTTP driver.
    ///
    /// Set via PULSO_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt fetch timeout in milliseconds.
    ///
    /// Set via PULSO_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via PULSO_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Whether the rendered-browser driver is enabled.
    ///
    /// Set via PULSO_RENDER_ENABLED environment variable.
    #[serde(default)]
    pub render_enabled: bool,

    /// Domain policies registered when an engine is built from this config.
    #[serde(default)]
    pub domains: BTreeMap<String, DomainSpec>,
}

fn default_session_id() -> String {
    DEFAULT_SESSION.into()
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Filesystem
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.pulso_cache")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_user_agent() -> String {
    "pulso/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            cache_backend: default_cache_backend(),
            cache_dir: default_cache_dir(),
            log_level: default_log_level(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            render_enabled: false,
            domains: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// SQLite database file used by the sqlite backend.
    pub fn db_path(&self) -> PathBuf {
        self.cache_dir.join("pulso.sqlite")
    }

    /// Load configuration from the environment and `PULSO_CONFIG_FILE`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PULSO_`
    /// 2. TOML file at `path`, or from `PULSO_CONFIG_FILE` when `path` is `None`
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - An explicit configuration file does not exist or cannot be parsed
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path
            && !path.is_file()
        {
            return Err(ConfigError::LoadFailed(format!("config file not found: {}", path.display())));
        }

        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PULSO_CONFIG_FILE").map(PathBuf::from));

        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        figment = figment.merge(
            Env::prefixed("PULSO_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.session_id, "default");
        assert_eq!(config.cache_backend, CacheBackend::Filesystem);
        assert_eq!(config.cache_dir, PathBuf::from("./.pulso_cache"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.user_agent, "pulso/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_bytes, 5_242_880);
        assert!(!config.render_enabled);
        assert!(config.domains.is_empty());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_db_path_under_cache_dir() {
        let config = AppConfig { cache_dir: PathBuf::from("/tmp/pulso"), ..Default::default() };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/pulso/pulso.sqlite"));
    }

    #[test]
    fn test_extract_toml_with_domains() {
        let toml = r#"
            session_id = "tenant_a"
            cache_backend = "sqlite"

            [domains."example.com"]
            ttl = "12h"
            driver = "requests"
            max_retries = 3
            retry_delay = 1.5
            fallback_on_error = "raise_error"
        "#;
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));
        let config = AppConfig::extract(figment).unwrap();

        assert_eq!(config.session_id, "tenant_a");
        assert_eq!(config.cache_backend, CacheBackend::Sqlite);
        let spec = &config.domains["example.com"];
        assert_eq!(spec.ttl, "12h");
        assert_eq!(spec.max_retries, 3);
        assert_eq!(spec.fallback_on_error, "raise_error");
    }

    #[test]
    fn test_extract_rejects_unknown_backend() {
        let figment =
            Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(r#"cache_backend = "redis""#));
        assert!(matches!(AppConfig::extract(figment), Err(ConfigError::LoadFailed(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulso.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "timeout_ms = 5000").unwrap();
        writeln!(file, "cache_backend = \"memory\"").unwrap();

        let config = AppConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.cache_backend, CacheBackend::Memory);
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = AppConfig::load_from(Some(Path::new("/nonexistent/pulso.toml")));
        assert!(matches!(result, Err(ConfigError::LoadFailed(_))));
    }
}
