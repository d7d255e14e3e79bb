//! Ambient session state.
//!
//! Every cache read and write is scoped by a session id. Callers may pass one
//! explicitly per call; otherwise the manager's current session applies.

use std::sync::{PoisonError, RwLock};

use crate::config::ConfigError;

/// Session used when none has been set.
pub const DEFAULT_SESSION: &str = "default";

/// Holds the current session id for an engine.
#[derive(Debug)]
pub struct SessionManager {
    current: RwLock<String>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION)
    }
}

impl SessionManager {
    pub fn new(initial: impl Into<String>) -> Self {
        Self { current: RwLock::new(initial.into()) }
    }

    pub fn get(&self) -> String {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the current session.
    pub fn set(&self, id: &str) -> Result<(), ConfigError> {
        let id = validate_session_id(id)?;
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if *current != id {
            tracing::debug!(from = %current, to = %id, "switching session");
            *current = id;
        }
        Ok(())
    }

    /// The explicit session if given, otherwise the current one.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        match explicit {
            Some(id) => validate_session_id(id),
            None => Ok(self.get()),
        }
    }
}

fn validate_session_id(id: &str) -> Result<String, ConfigError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ConfigError::Invalid { field: "session".into(), reason: "must not be empty".into() });
    }
    Ok(id.to_string())
}
