//! Error types for the keepsake library
//!
//! This module defines all error types that can occur during keepsake
//! operations. Expected absence (a lookup miss) is never an error in this
//! crate: those paths return `Option`/empty collections instead. The error
//! type covers genuine failures: storage quota exhaustion, serialization
//! problems, unresolvable restore targets and the like.

use thiserror::Error;

/// Type alias for Results in the keepsake library
pub type Result<T> = std::result::Result<T, KeepsakeError>;

/// Main error type for all keepsake operations
#[derive(Debug, Error)]
pub enum KeepsakeError {
    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backing store rejected a write because its capacity is exhausted
    #[error("Storage quota exceeded while writing key: {key}")]
    QuotaExceeded {
        /// Key whose write was rejected
        key: String,
    },

    /// Storage-related errors other than quota exhaustion
    #[error("Storage error: {0}")]
    Storage(String),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Backup not found in the metadata history or payload store
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// Backup creation failed (content collection or persistence)
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    /// Restore point could not be resolved
    #[error("Restore point not found: {0}")]
    RestorePointNotFound(String),

    /// Restore operation failed
    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    /// Invalid pattern in a protection rule
    #[error("Invalid protection pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<globset::Error> for KeepsakeError {
    fn from(err: globset::Error) -> Self {
        KeepsakeError::InvalidPattern(err.to_string())
    }
}

impl KeepsakeError {
    /// Create a storage error with a custom message
    pub fn storage(msg: impl Into<String>) -> Self {
        KeepsakeError::Storage(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        KeepsakeError::Internal(msg.into())
    }

    /// Create a restore-failure error with a custom message
    pub fn restore(msg: impl Into<String>) -> Self {
        KeepsakeError::RestoreFailed(msg.into())
    }

    /// Check if this error is a capacity-exhaustion condition
    ///
    /// Quota errors are first-class, expected outcomes: callers respond by
    /// walking the storage tier ladder rather than propagating.
    pub fn is_quota(&self) -> bool {
        matches!(self, KeepsakeError::QuotaExceeded { .. })
    }

    /// Check if this error is recoverable by retrying at reduced durability
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KeepsakeError::QuotaExceeded { .. } | KeepsakeError::Storage(_)
        )
    }
}
