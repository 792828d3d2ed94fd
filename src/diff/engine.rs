//! Plan types and statistics

use crate::types::{Operation, SyncMode};
use serde::Serialize;
use std::path::PathBuf;

/// Ordered operation list produced by the planner
///
/// The order is significant: the executor applies operations strictly in
/// sequence, and the planner relies on that to free paths before reuse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub mode: SyncMode,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub operations: Vec<Operation>,
    pub stats: PlanStats,
}

impl Plan {
    /// Create a new empty plan
    pub fn new(mode: SyncMode, source_root: PathBuf, target_root: PathBuf) -> Self {
        Self {
            mode,
            source_root,
            target_root,
            operations: Vec::new(),
            stats: PlanStats::default(),
        }
    }

    /// Append an operation; `bytes` is the file size for moves and copies
    pub fn add_operation(&mut self, operation: Operation, bytes: u64) {
        match &operation {
            Operation::CreateDir { .. } => self.stats.create_dir_count += 1,
            Operation::Move { .. } => {
                self.stats.move_count += 1;
                self.stats.bytes_to_move += bytes;
            }
            Operation::Copy { .. } => {
                self.stats.copy_count += 1;
                self.stats.bytes_to_copy += bytes;
            }
            Operation::Delete { .. } => self.stats.delete_count += 1,
        }
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }
}

/// Statistics about a plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PlanStats {
    pub move_count: usize,
    pub copy_count: usize,
    pub delete_count: usize,
    pub create_dir_count: usize,

    /// Bytes that must be physically copied
    pub bytes_to_copy: u64,

    /// Bytes relocated by rename (no data transfer on the same device)
    pub bytes_to_move: u64,
}

impl PlanStats {
    /// Rough time estimate for the copy portion of the plan
    ///
    /// Renames and deletes are metadata-only and counted at ~10ms each.
    ///
    /// # Example
    /// ```
    /// use shiftsync::diff::PlanStats;
    ///
    /// let stats = PlanStats {
    ///     bytes_to_copy: 1_000_000_000,
    ///     copy_count: 100,
    ///     ..Default::default()
    /// };
    /// assert_eq!(stats.estimate_duration(100 * 1024 * 1024), 10);
    /// ```
    pub fn estimate_duration(&self, bytes_per_second: u64) -> u64 {
        if bytes_per_second == 0 {
            return 0;
        }

        let base_seconds = self.bytes_to_copy / bytes_per_second;
        let file_ops = (self.copy_count + self.move_count + self.delete_count) as u64;
        base_seconds + file_ops * 10 / 1000
    }

    /// Estimate duration with a human-readable format like "2m 30s"
    pub fn estimate_duration_human(&self, bytes_per_second: u64) -> String {
        let total_seconds = self.estimate_duration(bytes_per_second);

        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        match (hours, minutes, seconds) {
            (0, 0, s) => format!("{}s", s),
            (0, m, 0) => format!("{}m", m),
            (0, m, s) => format!("{}m {}s", m, s),
            (h, 0, _) => format!("{}h", h),
            (h, m, _) => format!("{}h {}m", h, m),
        }
    }
}
