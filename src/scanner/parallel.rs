//! Parallel directory walker based on ignore crate's parallel traversal.
//!
//! Hashing happens inside the walker's visitor, so the walker's thread count
//! is also the bound on concurrent file hashing.

use crate::cache::FingerprintCache;
use crate::scanner::walker::{
    describe_file, relative_path, walk_builder, walk_error_path, EntryFilter, ProgressCallback,
};
use crate::scanner::{ScanFailure, ScanOptions, ScanReport};
use crate::types::{FileEntry, Snapshot, SyncError};
use camino::Utf8PathBuf;
use ignore::WalkState;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Default)]
struct CollectedScan {
    files: Vec<FileEntry>,
    failures: Vec<ScanFailure>,
    dirs: Vec<Utf8PathBuf>,
}

#[derive(Default)]
struct ProgressState {
    files: u64,
    bytes: u64,
}

/// Scan a directory in parallel and build a `Snapshot`.
pub fn scan_directory_parallel(
    root_path: &Path,
    options: &ScanOptions,
    cache: &dyn FingerprintCache,
    on_progress: Option<&ProgressCallback>,
) -> Result<ScanReport, SyncError> {
    let start_time = Instant::now();

    let filter = EntryFilter::new(root_path, options)?;
    let collected = Mutex::new(CollectedScan::default());
    let progress = Mutex::new(ProgressState::default());

    let walker = walk_builder(root_path, filter)
        .threads(options.threads.max(1))
        .build_parallel();

    walker.run(|| {
        let collected = &collected;
        let progress = &progress;

        Box::new(move |result| {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = walk_error_path(&e).unwrap_or_else(|| root_path.to_path_buf());
                    warn!(path = %path.display(), error = %e, "error during directory traversal, continuing");
                    if let Ok(mut scan) = collected.lock() {
                        scan.failures.push(ScanFailure {
                            path,
                            reason: e.to_string(),
                        });
                    }
                    return WalkState::Continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                return WalkState::Continue;
            };

            if file_type.is_dir() {
                if entry.depth() > 0 {
                    let rel = relative_path(root_path, entry.path());
                    let Ok(mut scan) = collected.lock() else {
                        return WalkState::Quit;
                    };
                    match rel {
                        Ok(rel) => scan.dirs.push(rel),
                        Err(reason) => {
                            warn!(path = %entry.path().display(), %reason, "directory skipped");
                            scan.failures.push(ScanFailure {
                                path: entry.path().to_path_buf(),
                                reason,
                            });
                        }
                    }
                }
                return WalkState::Continue;
            }

            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "symlink not followed");
                return WalkState::Continue;
            }

            if !file_type.is_file() {
                return WalkState::Continue;
            }

            let outcome = entry
                .metadata()
                .map_err(|e| SyncError::Scan {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                })
                .and_then(|metadata| {
                    describe_file(root_path, entry.path(), &metadata, options, cache)
                });

            let mut scan = match collected.lock() {
                Ok(s) => s,
                Err(_) => return WalkState::Quit,
            };
            match outcome {
                Ok(file_entry) => {
                    let size = file_entry.size;
                    scan.files.push(file_entry);
                    drop(scan);

                    if let Some(callback) = on_progress {
                        let mut state = match progress.lock() {
                            Ok(state) => state,
                            Err(_) => return WalkState::Quit,
                        };
                        state.files += 1;
                        state.bytes += size;
                        callback(state.files, state.bytes);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "file skipped");
                    scan.failures.push(ScanFailure::from_error(entry.path(), err));
                }
            }

            WalkState::Continue
        })
    });

    let collected = collected
        .into_inner()
        .map_err(|_| SyncError::Validation("parallel scan state was poisoned".to_string()))?;

    let mut snapshot = Snapshot::new(root_path.to_path_buf());
    for file in collected.files {
        snapshot.insert(file);
    }
    for dir in collected.dirs {
        snapshot.insert_dir(dir);
    }
    snapshot.set_scan_duration(start_time.elapsed());

    // Walker threads finish in arbitrary order
    let mut failures = collected.failures;
    failures.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanReport { snapshot, failures })
}
