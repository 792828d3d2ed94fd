//! Main reconciliation command

use crate::cache::{CacheStore, FingerprintCache};
use crate::diff::{classify, plan_mirror, plan_move, Classification, ClassificationSummary, Plan};
use crate::executor::{
    DryRunExecutor, ExecutionCallback, ExecutionEvent, ExecutionReport, Executor, FsExecutor,
    SkipReason,
};
use crate::scanner::{relative_path, scan_tree, ProgressCallback, ScanFailure, ScanOptions, ScanReport};
use crate::types::{Side, Snapshot, SyncError, SyncMode};
use crate::ui::ProgressReporter;
use crate::Config;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{info, warn};

/// Everything went through
pub const EXIT_SUCCESS: u8 = 0;
/// The run completed but an operation failed or a file was unreadable
pub const EXIT_FAILURES: u8 = 1;
/// Configuration, planning, or other fatal error; nothing was applied
pub const EXIT_FATAL: u8 = 2;

/// Scan outcome for one tree
#[derive(Debug, Clone, Serialize)]
pub struct TreeScanSummary {
    pub root: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub elapsed_ms: u64,
    pub failures: Vec<ScanFailure>,
}

impl TreeScanSummary {
    fn from_report(report: &ScanReport) -> Self {
        let snapshot = &report.snapshot;
        Self {
            root: snapshot.root_path.clone(),
            files: snapshot.total_files,
            directories: snapshot.total_dirs,
            bytes: snapshot.total_size,
            elapsed_ms: snapshot.scan_duration.as_millis() as u64,
            failures: report.failures.clone(),
        }
    }
}

/// Structured result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: SyncMode,
    pub dry_run: bool,
    pub source: TreeScanSummary,
    /// Not scanned in MOVE mode
    pub target: Option<TreeScanSummary>,
    /// MOVE mode does not classify
    pub summary: Option<ClassificationSummary>,
    pub classification: Option<Classification>,
    pub plan: Plan,
    pub execution: ExecutionReport,
}

impl RunReport {
    pub fn scan_failure_count(&self) -> usize {
        self.source.failures.len() + self.target.as_ref().map_or(0, |t| t.failures.len())
    }

    pub fn is_success(&self) -> bool {
        self.scan_failure_count() == 0 && !self.execution.has_failures()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURES
        }
    }
}

/// Run one reconciliation: scan, classify, plan, then apply or report
pub fn run(config: &Config) -> Result<RunReport, SyncError> {
    let reporter = if config.json || !console::Term::stderr().is_term() {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new()
    };
    let reporter = Arc::new(Mutex::new(reporter));

    let mut store = match &config.cache_path {
        Some(path) => CacheStore::open(path),
        None => CacheStore::in_memory(),
    };
    let internal_files = internal_files(store.location());
    let hash_contents = config.mode == SyncMode::Mirror;
    let scan_target = config.mode == SyncMode::Mirror && config.target.exists();

    let source_options = scan_options(config, &config.source, &internal_files, hash_contents);
    let target_options = scan_options(config, &config.target, &internal_files, hash_contents);
    let source_cache = store.tree(&config.source);
    let target_cache = store.tree(&config.target);

    info!(
        source = %config.source.display(),
        target = %config.target.display(),
        mode = ?config.mode,
        dry_run = config.dry_run,
        "scanning"
    );
    let (source_bar, target_bar) = match reporter.lock() {
        Ok(progress) => {
            progress.start_scan(Side::Source);
            if scan_target {
                progress.start_scan(Side::Target);
            }
            (progress.scan_bar(Side::Source), progress.scan_bar(Side::Target))
        }
        Err(_) => return Err(SyncError::Validation("progress state was poisoned".to_string())),
    };

    let (source_scan, target_scan) = thread::scope(|scope| {
        let target_handle = scan_target.then(|| {
            scope.spawn(|| {
                scan_side(
                    &config.target,
                    &target_options,
                    target_cache.as_ref(),
                    Side::Target,
                    target_bar,
                )
            })
        });

        let source = scan_side(
            &config.source,
            &source_options,
            source_cache.as_ref(),
            Side::Source,
            source_bar,
        );
        let target = match target_handle {
            Some(handle) => Some(handle.join().map_err(|_| {
                SyncError::Validation("target scan thread panicked".to_string())
            })??),
            None => None,
        };
        Ok::<_, SyncError>((source?, target))
    })?;

    if let Ok(progress) = reporter.lock() {
        progress.finish_scan(
            Side::Source,
            source_scan.snapshot.total_files,
            source_scan.snapshot.total_size,
        );
        if let Some(target) = &target_scan {
            progress.finish_scan(Side::Target, target.snapshot.total_files, target.snapshot.total_size);
        }
    }

    if hash_contents {
        source_cache.retain_paths(&live_paths(&source_scan.snapshot));
        if let Some(target) = &target_scan {
            target_cache.retain_paths(&live_paths(&target.snapshot));
        }
    }
    if let Err(err) = store.save() {
        warn!(error = %err, "could not save fingerprint cache");
    }

    let source_summary = TreeScanSummary::from_report(&source_scan);
    let target_summary = target_scan.as_ref().map(TreeScanSummary::from_report);

    let (classification, plan) = match config.mode {
        SyncMode::Mirror => {
            let mut target_snapshot = target_scan
                .map(|report| report.snapshot)
                .unwrap_or_else(|| Snapshot::new(config.target.clone()));
            protect_unreadable(&config.source, &source_scan.failures, &mut target_snapshot);

            let classification = classify(&source_scan.snapshot, &target_snapshot);
            let plan = plan_mirror(&classification, &source_scan.snapshot, &target_snapshot)?;
            (Some(classification), plan)
        }
        SyncMode::Move => (None, plan_move(&source_scan.snapshot, config.target.clone())),
    };
    info!(
        operations = plan.len(),
        moves = plan.stats.move_count,
        copies = plan.stats.copy_count,
        deletes = plan.stats.delete_count,
        "plan ready"
    );

    let execution = if config.dry_run {
        DryRunExecutor::new().apply(&plan)
    } else {
        if !config.target.exists() {
            fs::create_dir_all(&config.target)?;
        }
        if !plan.is_empty() {
            if let Ok(mut progress) = reporter.lock() {
                progress.start_apply(plan.len() as u64);
            }
        }
        FsExecutor::new()
            .with_callback(progress_callback(Arc::clone(&reporter)))
            .apply(&plan)
    };

    Ok(RunReport {
        mode: config.mode,
        dry_run: config.dry_run,
        source: source_summary,
        target: target_summary,
        summary: classification.as_ref().map(Classification::summary),
        classification,
        plan,
        execution,
    })
}

fn scan_side(
    root: &Path,
    options: &ScanOptions,
    cache: &dyn FingerprintCache,
    side: Side,
    bar: indicatif::ProgressBar,
) -> Result<ScanReport, SyncError> {
    let on_progress: ProgressCallback = Box::new(move |files: u64, bytes: u64| {
        ProgressReporter::update_scan(&bar, side, files, bytes);
    });
    scan_tree(root, options, cache, Some(&on_progress))
}

fn scan_options(
    config: &Config,
    root: &Path,
    internal_files: &[PathBuf],
    hash_contents: bool,
) -> ScanOptions {
    ScanOptions {
        exclude_patterns: config.exclude_patterns.clone(),
        skip_files: skip_paths_for(root, internal_files),
        hash_contents,
        threads: config.threads,
    }
}

/// Files this tool writes itself: the cache and its save temp
fn internal_files(cache_location: Option<&Path>) -> Vec<PathBuf> {
    let Some(location) = cache_location else {
        return Vec::new();
    };
    let absolute = absolute_file(location);
    vec![absolute.with_extension("json.tmp"), absolute]
}

/// Walker paths are `root.join(relative)`, so internal files are re-expressed
/// relative to `root` as given
fn skip_paths_for(root: &Path, internal_files: &[PathBuf]) -> Vec<PathBuf> {
    let Ok(absolute_root) = fs::canonicalize(root) else {
        return Vec::new();
    };
    internal_files
        .iter()
        .filter_map(|file| file.strip_prefix(&absolute_root).ok())
        .map(|rel| root.join(rel))
        .collect()
}

/// Canonical parent directory plus file name; the file itself may not exist
fn absolute_file(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = fs::canonicalize(&parent)
        .or_else(|_| std::path::absolute(&parent))
        .unwrap_or(parent);
    match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    }
}

fn live_paths(snapshot: &Snapshot) -> HashSet<&Utf8Path> {
    snapshot.paths().map(Utf8PathBuf::as_path).collect()
}

/// Target files whose source counterpart could not be read are left alone
/// rather than classified as removed
fn protect_unreadable(source_root: &Path, failures: &[ScanFailure], target: &mut Snapshot) {
    for failure in failures {
        let Ok(rel) = relative_path(source_root, &failure.path) else {
            continue;
        };
        let shielded: Vec<Utf8PathBuf> = target
            .paths()
            .filter(|path| path.starts_with(&rel))
            .cloned()
            .collect();
        for path in shielded {
            warn!(path = %path, "source copy unreadable, leaving target file untouched");
            target.remove(&path);
        }
    }
}

fn progress_callback(reporter: Arc<Mutex<ProgressReporter>>) -> ExecutionCallback {
    Box::new(move |event: &ExecutionEvent| {
        let Ok(mut progress) = reporter.lock() else {
            return;
        };
        match event {
            ExecutionEvent::ActionStart { action, path, .. } => {
                progress.set_current(action, path);
            }
            ExecutionEvent::ActionSuccess { bytes_copied, .. } => {
                progress.complete_operation(*bytes_copied);
            }
            ExecutionEvent::ActionError {
                action,
                path,
                error,
                ..
            } => {
                progress.operation_problem("ERROR", action, path, error);
            }
            ExecutionEvent::ActionSkipped {
                action,
                path,
                reason,
                ..
            } => {
                let detail = match reason {
                    SkipReason::DependencyFailed => "depends on a failed operation",
                    SkipReason::DryRun => "dry run",
                };
                progress.operation_problem("SKIP", action, path, detail);
            }
            ExecutionEvent::Complete { stats } => {
                progress.finish_apply(stats);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileEntry;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    #[test]
    fn test_skip_paths_follow_root_spelling() {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path().join("tree");
        fs::create_dir(&root).expect("create root");
        let cache = absolute_file(&root.join("cache.json"));

        let skips = skip_paths_for(&root, &internal_files(Some(&cache)));
        assert_eq!(
            skips,
            vec![root.join("cache.json.tmp"), root.join("cache.json")]
        );
    }

    #[test]
    fn test_skip_paths_ignore_files_outside_root() {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path().join("tree");
        fs::create_dir(&root).expect("create root");

        let outside = absolute_file(&temp.path().join("cache.json"));
        assert!(skip_paths_for(&root, &internal_files(Some(&outside))).is_empty());
        assert!(internal_files(None).is_empty());
    }

    #[test]
    fn test_protect_unreadable_shields_target_subtree() {
        let mut target = Snapshot::new(PathBuf::from("/t"));
        for path in ["locked.txt", "dir/a", "dir/b", "other"] {
            target.insert(FileEntry::new(path, 1, UNIX_EPOCH));
        }
        let failures = vec![
            ScanFailure {
                path: PathBuf::from("/s/locked.txt"),
                reason: "permission denied".to_string(),
            },
            ScanFailure {
                path: PathBuf::from("/s/dir"),
                reason: "permission denied".to_string(),
            },
        ];

        protect_unreadable(Path::new("/s"), &failures, &mut target);
        let left: Vec<&str> = target.paths().map(|p| p.as_str()).collect();
        assert_eq!(left, vec!["other"]);
    }

    #[test]
    fn test_exit_code_reflects_scan_failures() {
        let report = RunReport {
            mode: SyncMode::Mirror,
            dry_run: true,
            source: TreeScanSummary {
                root: PathBuf::from("/s"),
                files: 0,
                directories: 0,
                bytes: 0,
                elapsed_ms: 0,
                failures: vec![ScanFailure {
                    path: PathBuf::from("/s/x"),
                    reason: "denied".to_string(),
                }],
            },
            target: None,
            summary: None,
            classification: None,
            plan: Plan::new(SyncMode::Mirror, PathBuf::from("/s"), PathBuf::from("/t")),
            execution: ExecutionReport::default(),
        };
        assert_eq!(report.scan_failure_count(), 1);
        assert_eq!(report.exit_code(), EXIT_FAILURES);
    }
}
