//! Unified error types for pulso.
//!
//! Driver failures stay inside the fetch loop; only `Error::Fetch` carries
//! one out, and only when a domain's fallback mode asks for it.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

use crate::config::ConfigError;
use crate::driver::DriverError;

/// Unified error type for the pulso engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing domain policy, unparseable TTL, invalid settings.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// All fetch attempts failed and the policy demands raising.
    #[error("FETCH_FAILED: {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: DriverError,
    },

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No cache entry or snapshot for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Filesystem backend I/O failed.
    #[error("CACHE_ERROR: io: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("CACHE_ERROR: corrupt record: {0}")]
    Corrupt(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::Config(_) => -32000,
            Error::CacheMiss(_) => -32001,
            Error::Database(_) | Error::MigrationFailed(_) | Error::Io(_) | Error::Corrupt(_) => -32002,
            Error::InvalidUrl(_) => -32003,
            Error::Fetch { .. } => -32008,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("https://example.com/".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_fetch_error_carries_driver_failure() {
        let err = Error::Fetch { url: "https://example.com/".into(), source: DriverError::Status { code: 503 } };
        let msg = err.to_string();
        assert!(msg.starts_with("FETCH_FAILED"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_config_error_wraps() {
        let err: Error = ConfigError::InvalidTtl("soon".into()).into();
        assert!(err.to_string().starts_with("CONFIG_ERROR"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::CacheMiss("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);

        let err = Error::InvalidInput("missing filter".into());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }
}
