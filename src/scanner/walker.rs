//! Sequential directory walker and the per-file description shared by both walkers

use crate::cache::FingerprintCache;
use crate::hash::compute_hash;
use crate::scanner::{ScanFailure, ScanOptions, ScanReport};
use crate::types::{FileEntry, Snapshot, SyncError};
use camino::Utf8PathBuf;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Suffix of in-flight copies written by the executor; never part of a tree
pub const PART_FILE_SUFFIX: &str = ".shiftsync-part";

/// Callback for reporting scan progress
///
/// Arguments:
/// - `files_scanned`: Total number of files scanned so far
/// - `bytes_scanned`: Total bytes scanned so far
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Compile exclude globs into one matcher
pub fn compile_patterns(patterns: &[String]) -> Result<GlobSet, SyncError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            SyncError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
        // `build/` style patterns should also cover everything below
        if !pattern.ends_with("/**") {
            let nested = format!("{}/**", pattern.trim_end_matches('/'));
            if let Ok(glob) = Glob::new(&nested) {
                builder.add(glob);
            }
        }
    }
    builder
        .build()
        .map_err(|e| SyncError::Config(format!("Failed to build exclude patterns: {}", e)))
}

/// Entry filter applied while walking; returning false prunes the entry
#[derive(Clone)]
pub(crate) struct EntryFilter {
    root: PathBuf,
    excludes: Arc<GlobSet>,
    skip_files: Arc<Vec<PathBuf>>,
}

impl EntryFilter {
    pub(crate) fn new(root: &Path, options: &ScanOptions) -> Result<Self, SyncError> {
        Ok(Self {
            root: root.to_path_buf(),
            excludes: Arc::new(compile_patterns(&options.exclude_patterns)?),
            skip_files: Arc::new(options.skip_files.clone()),
        })
    }

    pub(crate) fn keep(&self, path: &Path) -> bool {
        if self.skip_files.iter().any(|skip| skip == path) {
            trace!(path = %path.display(), "skipping internal file");
            return false;
        }
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PART_FILE_SUFFIX))
        {
            return false;
        }
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => true,
            Ok(rel) => !self.excludes.is_match(rel),
            Err(_) => true,
        }
    }
}

/// Build the `ignore` walker configuration shared by both scan modes.
///
/// Ignore files are not consulted and hidden files are included: a mirror
/// must see everything. Symlinks are reported but never followed.
pub(crate) fn walk_builder(root: &Path, filter: EntryFilter) -> ignore::WalkBuilder {
    let mut builder = ignore::WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(move |entry| filter.keep(entry.path()));
    builder
}

/// Slash-normalized relative path of `path` below `root`
pub fn relative_path(root: &Path, path: &Path) -> Result<Utf8PathBuf, String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| "path lies outside the scan root".to_string())?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s),
                None => return Err("file name is not valid UTF-8".to_string()),
            },
            Component::CurDir => {}
            _ => return Err("unexpected path component".to_string()),
        }
    }
    Ok(Utf8PathBuf::from(parts.join("/")))
}

/// Describe one regular file: metadata, then a cached or freshly computed hash
pub(crate) fn describe_file(
    root: &Path,
    path: &Path,
    metadata: &Metadata,
    options: &ScanOptions,
    cache: &dyn FingerprintCache,
) -> Result<FileEntry, SyncError> {
    let failure = |reason: String| SyncError::Scan {
        path: path.to_path_buf(),
        reason,
    };

    let relative = relative_path(root, path).map_err(failure)?;
    let mtime = metadata
        .modified()
        .map_err(|e| failure(format!("cannot read modification time: {}", e)))?;
    let entry = FileEntry::new(relative, metadata.len(), mtime);

    if !options.hash_contents {
        return Ok(entry);
    }

    if let Some(hash) = cache.get(&entry.path, entry.size, entry.mtime) {
        trace!(path = %entry.path, "fingerprint cache hit");
        return Ok(entry.with_hash(hash));
    }

    let hash = compute_hash(path).map_err(|e| failure(e.to_string()))?;
    debug!(path = %entry.path, size = entry.size, "hashed file");
    cache.put(&entry.path, entry.size, entry.mtime, hash);
    Ok(entry.with_hash(hash))
}

pub(crate) fn walk_error_path(error: &ignore::Error) -> Option<PathBuf> {
    match error {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        _ => None,
    }
}

/// Scan a directory sequentially and build a Snapshot
///
/// Unreadable files are recorded in the report and left out of the snapshot;
/// they never stop the scan.
///
/// # Errors
/// * Invalid exclude patterns return `SyncError::Config`
pub fn scan_directory(
    root_path: &Path,
    options: &ScanOptions,
    cache: &dyn FingerprintCache,
    on_progress: Option<&ProgressCallback>,
) -> Result<ScanReport, SyncError> {
    let start_time = Instant::now();
    let mut snapshot = Snapshot::new(root_path.to_path_buf());
    let mut failures = Vec::new();

    let mut scanned_count: u64 = 0;
    let mut scanned_bytes: u64 = 0;

    let filter = EntryFilter::new(root_path, options)?;
    let walker = walk_builder(root_path, filter).build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                let path = walk_error_path(&e).unwrap_or_else(|| root_path.to_path_buf());
                warn!(path = %path.display(), error = %e, "error during directory traversal, continuing");
                failures.push(ScanFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if entry.depth() > 0 {
                match relative_path(root_path, entry.path()) {
                    Ok(rel) => snapshot.insert_dir(rel),
                    Err(reason) => {
                        warn!(path = %entry.path().display(), %reason, "directory skipped");
                        failures.push(ScanFailure {
                            path: entry.path().to_path_buf(),
                            reason,
                        });
                    }
                }
            }
            continue;
        }

        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "symlink not followed");
            continue;
        }

        // Skip special files (pipes, sockets, devices, etc.)
        if !file_type.is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot read metadata, file skipped");
                failures.push(ScanFailure {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match describe_file(root_path, entry.path(), &metadata, options, cache) {
            Ok(file_entry) => {
                scanned_count += 1;
                scanned_bytes += file_entry.size;
                snapshot.insert(file_entry);

                if let Some(callback) = on_progress {
                    callback(scanned_count, scanned_bytes);
                }
            }
            Err(err) => {
                warn!(error = %err, "file skipped");
                failures.push(ScanFailure::from_error(entry.path(), err));
            }
        }
    }

    snapshot.set_scan_duration(start_time.elapsed());

    Ok(ScanReport { snapshot, failures })
}
