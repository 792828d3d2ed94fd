//! Error types for shiftsync

use camino::Utf8PathBuf;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for shiftsync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error (logic checks)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single file could not be described during a scan
    #[error("Scan error: {path}: {reason}")]
    Scan { path: PathBuf, reason: String },

    /// Fingerprint cache unavailable or corrupt
    #[error("Cache error: {0}")]
    Cache(String),

    /// Two operations would write the same destination without a resolving order
    #[error("Plan conflict at {path}: {reason}")]
    PlanConflict { path: Utf8PathBuf, reason: String },

    /// A planned operation failed against the filesystem
    #[error("Execution error at {path}: {reason}")]
    Execution { path: PathBuf, reason: String },
}

impl SyncError {
    /// Errors that are recovered locally and only summarized in the report
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Scan { .. } | SyncError::Cache(_) | SyncError::Execution { .. }
        )
    }

    /// Check if this error is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::Config(_))
    }

    /// Planning-time invariant violations abort the run before any mutation
    pub fn is_plan_conflict(&self) -> bool {
        matches!(self, SyncError::PlanConflict { .. })
    }
}
