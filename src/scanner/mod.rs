//! Directory scanning logic

mod parallel;
mod walker;

pub use parallel::scan_directory_parallel;
pub use walker::{compile_patterns, relative_path, scan_directory, ProgressCallback, PART_FILE_SUFFIX};

use crate::cache::FingerprintCache;
use crate::types::{Snapshot, SyncError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Knobs for one scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Globs (relative paths) to leave out of the snapshot
    pub exclude_patterns: Vec<String>,

    /// Absolute paths never to include (e.g. the fingerprint cache file)
    pub skip_files: Vec<PathBuf>,

    /// Compute content hashes; MOVE mode does not need them
    pub hash_contents: bool,

    /// Walker/hasher threads; 1 selects the sequential walker
    pub threads: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            skip_files: Vec::new(),
            hash_contents: true,
            threads: 4,
        }
    }
}

/// A file that could not be described; excluded from the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl ScanFailure {
    /// Flatten a per-file error into its report form
    pub(crate) fn from_error(path: &Path, error: SyncError) -> Self {
        match error {
            SyncError::Scan { path, reason } => Self { path, reason },
            other => Self {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}

/// Snapshot plus the per-file failures met while building it
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: Snapshot,
    pub failures: Vec<ScanFailure>,
}

/// Scan `root_path`, choosing the sequential or parallel walker by thread count
pub fn scan_tree(
    root_path: &Path,
    options: &ScanOptions,
    cache: &dyn FingerprintCache,
    on_progress: Option<&ProgressCallback>,
) -> Result<ScanReport, SyncError> {
    let report = if options.threads <= 1 {
        scan_directory(root_path, options, cache, on_progress)?
    } else {
        scan_directory_parallel(root_path, options, cache, on_progress)?
    };

    info!(
        root = %root_path.display(),
        files = report.snapshot.total_files,
        bytes = report.snapshot.total_size,
        failures = report.failures.len(),
        elapsed_ms = report.snapshot.scan_duration.as_millis() as u64,
        "scan complete"
    );
    Ok(report)
}
