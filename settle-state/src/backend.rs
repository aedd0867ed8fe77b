//! State backend trait and error types

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The state is locked by another process
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation}, expires {expires})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
        expires: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// Lock ID mismatch when trying to release
    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// State file is corrupted or invalid
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// The stored state belongs to a different lineage
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    /// The stored state is newer than the one being written
    #[error("Stale state: stored serial is {stored}, refusing to write serial {attempted}")]
    StaleSerial { stored: u64, attempted: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
            expires: lock.expires.to_rfc3339(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file, with locking for concurrent access control
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state; `None` before the first apply
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state
    ///
    /// Fails if the stored state has a different lineage or a serial at
    /// least as high as `state`'s; increment the serial before writing.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Acquire a lock for the given operation
    ///
    /// Fails while another unexpired lock is held.
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Release a lock previously returned by [`StateBackend::acquire_lock`]
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove a lock by ID regardless of who holds it
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

/// The manifest's `backend` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type", default = "BackendConfig::default_type")]
    pub backend_type: String,
    /// State file location for the local backend
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl BackendConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            backend_type: Self::default_type(),
            path: Some(path.into()),
        }
    }

    fn default_type() -> String {
        "local".to_string()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: Self::default_type(),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_locked() {
        let lock = LockInfo::new("apply");
        match BackendError::locked(&lock) {
            BackendError::Locked {
                lock_id,
                who,
                operation,
                ..
            } => {
                assert_eq!(lock_id, lock.id);
                assert_eq!(who, lock.who);
                assert_eq!(operation, "apply");
            }
            other => panic!("Expected Locked error, got {:?}", other),
        }
    }

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::UnsupportedBackend("s3".to_string());
        assert_eq!(error.to_string(), "Unsupported backend type: s3");

        let error = BackendError::StaleSerial {
            stored: 4,
            attempted: 3,
        };
        assert_eq!(
            error.to_string(),
            "Stale state: stored serial is 4, refusing to write serial 3"
        );
    }

    #[test]
    fn backend_block_defaults_to_local() {
        let config: BackendConfig = serde_json::from_str(r#"{"path": "prod.state.json"}"#).unwrap();
        assert_eq!(config, BackendConfig::local("prod.state.json"));

        let config: BackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BackendConfig::default());
    }
}
