//! Executor module for plan application
//!
//! The command layer picks an `Executor`: `FsExecutor` mutates the target (and,
//! in MOVE mode, the source) tree, `DryRunExecutor` only reports.

pub mod copy;

pub use copy::{copy_file_atomic, move_file, part_path_for};

use crate::diff::Plan;
use crate::types::{Operation, Side, SyncError, TreePath};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Execution progress statistics for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Number of operations in the input plan
    pub total_operations: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Bytes physically written (copies and cross-device moves)
    pub bytes_copied: u64,
}

/// Why an operation was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DryRun,
    /// An earlier operation on an overlapping path failed
    DependencyFailed,
}

/// Result of one planned operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { reason: String },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub operation: Operation,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Per-operation outcomes plus aggregate stats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<OperationOutcome>,
    pub stats: ExecutionStats,
}

impl ExecutionReport {
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }

    /// Failed operations with their reasons
    pub fn failures(&self) -> impl Iterator<Item = (&Operation, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed { reason } => Some((&o.operation, reason.as_str())),
            _ => None,
        })
    }

    fn record(&mut self, operation: &Operation, outcome: Outcome, bytes: u64) {
        match &outcome {
            Outcome::Succeeded => {
                self.stats.succeeded += 1;
                self.stats.bytes_copied += bytes;
            }
            Outcome::Failed { .. } => self.stats.failed += 1,
            Outcome::Skipped { .. } => self.stats.skipped += 1,
        }
        self.outcomes.push(OperationOutcome {
            operation: operation.clone(),
            outcome,
        });
    }
}

/// Events emitted while executing a plan
#[derive(Debug)]
pub enum ExecutionEvent {
    /// Operation execution started
    ActionStart {
        index: usize,
        total: usize,
        action: &'static str,
        path: TreePath,
    },
    /// Operation execution succeeded
    ActionSuccess {
        index: usize,
        total: usize,
        action: &'static str,
        path: TreePath,
        bytes_copied: u64,
    },
    /// Operation failed but the executor continued
    ActionError {
        index: usize,
        total: usize,
        action: &'static str,
        path: TreePath,
        error: String,
    },
    /// Operation not attempted
    ActionSkipped {
        index: usize,
        total: usize,
        action: &'static str,
        path: TreePath,
        reason: SkipReason,
    },
    /// Plan execution completed (with or without errors)
    Complete { stats: ExecutionStats },
}

/// Optional callback used to receive execution events
pub type ExecutionCallback = Box<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Applies a plan, strictly in order
pub trait Executor {
    fn apply(&self, plan: &Plan) -> ExecutionReport;
}

/// Applies plans against the real filesystem
///
/// Continues past per-operation failures; any later operation touching a path
/// that overlaps a failed one is skipped instead of attempted.
#[derive(Default)]
pub struct FsExecutor {
    on_event: Option<ExecutionCallback>,
}

impl FsExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, callback: ExecutionCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
    }
}

impl Executor for FsExecutor {
    fn apply(&self, plan: &Plan) -> ExecutionReport {
        let total = plan.len();
        let mut report = ExecutionReport {
            stats: ExecutionStats {
                total_operations: total,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut tainted: Vec<TreePath> = Vec::new();

        for (idx, operation) in plan.iter().enumerate() {
            let index = idx + 1;
            let action = operation.action_name();
            let path = operation.path().clone();

            let touched = operation.touched_paths();
            if touched
                .iter()
                .any(|p| tainted.iter().any(|bad| bad.overlaps(p)))
            {
                warn!(operation = %operation, "skipped, depends on a failed operation");
                tainted.extend(touched.into_iter().cloned());
                self.emit(ExecutionEvent::ActionSkipped {
                    index,
                    total,
                    action,
                    path,
                    reason: SkipReason::DependencyFailed,
                });
                report.record(
                    operation,
                    Outcome::Skipped {
                        reason: SkipReason::DependencyFailed,
                    },
                    0,
                );
                continue;
            }

            self.emit(ExecutionEvent::ActionStart {
                index,
                total,
                action,
                path: path.clone(),
            });
            debug!(operation = %operation, "applying");

            match apply_operation(operation, plan) {
                Ok(bytes) => {
                    self.emit(ExecutionEvent::ActionSuccess {
                        index,
                        total,
                        action,
                        path,
                        bytes_copied: bytes,
                    });
                    report.record(operation, Outcome::Succeeded, bytes);
                }
                Err(err) => {
                    error!(operation = %operation, error = %err, "operation failed");
                    tainted.extend(touched.into_iter().cloned());
                    self.emit(ExecutionEvent::ActionError {
                        index,
                        total,
                        action,
                        path,
                        error: err.to_string(),
                    });
                    report.record(
                        operation,
                        Outcome::Failed {
                            reason: err.to_string(),
                        },
                        0,
                    );
                }
            }
        }

        info!(
            succeeded = report.stats.succeeded,
            failed = report.stats.failed,
            skipped = report.stats.skipped,
            bytes = report.stats.bytes_copied,
            "plan applied"
        );
        self.emit(ExecutionEvent::Complete {
            stats: report.stats.clone(),
        });
        report
    }
}

/// Reporting sink: logs every operation and touches nothing
#[derive(Default)]
pub struct DryRunExecutor {
    on_event: Option<ExecutionCallback>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, callback: ExecutionCallback) -> Self {
        self.on_event = Some(callback);
        self
    }
}

impl Executor for DryRunExecutor {
    fn apply(&self, plan: &Plan) -> ExecutionReport {
        let total = plan.len();
        let mut report = ExecutionReport {
            stats: ExecutionStats {
                total_operations: total,
                ..Default::default()
            },
            ..Default::default()
        };

        for (idx, operation) in plan.iter().enumerate() {
            info!(operation = %operation, "dry run");
            if let Some(callback) = &self.on_event {
                callback(&ExecutionEvent::ActionSkipped {
                    index: idx + 1,
                    total,
                    action: operation.action_name(),
                    path: operation.path().clone(),
                    reason: SkipReason::DryRun,
                });
            }
            report.record(
                operation,
                Outcome::Skipped {
                    reason: SkipReason::DryRun,
                },
                0,
            );
        }

        if let Some(callback) = &self.on_event {
            callback(&ExecutionEvent::Complete {
                stats: report.stats.clone(),
            });
        }
        report
    }
}

/// Absolute location of a planned path
pub fn resolve(plan: &Plan, path: &TreePath) -> PathBuf {
    let root = match path.side {
        Side::Source => &plan.source_root,
        Side::Target => &plan.target_root,
    };
    root.join(path.path.as_std_path())
}

fn apply_operation(operation: &Operation, plan: &Plan) -> Result<u64, SyncError> {
    match operation {
        Operation::CreateDir { path } => {
            let dir = resolve(plan, path);
            fs::create_dir_all(&dir).map_err(|e| execution_error(&dir, e))?;
            Ok(0)
        }
        Operation::Move { from, to } => {
            let dest = resolve(plan, to);
            ensure_vacant(&dest)?;
            move_file(&resolve(plan, from), &dest)
        }
        Operation::Copy { from, to } => {
            let dest = resolve(plan, to);
            ensure_vacant(&dest)?;
            copy_file_atomic(&resolve(plan, from), &dest)
        }
        Operation::Delete { path } => {
            execute_delete(&resolve(plan, path))?;
            Ok(0)
        }
    }
}

/// Writes never replace anything; the tree changed since the scan otherwise
fn ensure_vacant(dest: &Path) -> Result<(), SyncError> {
    match fs::symlink_metadata(dest) {
        Ok(_) => Err(SyncError::Execution {
            path: dest.to_path_buf(),
            reason: "destination already exists".to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(execution_error(dest, e)),
    }
}

/// Remove a file or an empty directory; a missing path is success
fn execute_delete(path: &Path) -> Result<(), SyncError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(execution_error(path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(execution_error(path, e)),
    }
}

fn execution_error(path: &Path, error: std::io::Error) -> SyncError {
    SyncError::Execution {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
