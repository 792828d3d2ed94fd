//! Operation - filesystem steps emitted by the planner

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reconciliation mode
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Make target's file set and layout match source, moving renamed files
    #[default]
    Mirror,

    /// Relocate every source file into target; source directories stay
    Move,
}

/// Which tree a planned path lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

/// A relative path anchored to one of the two roots
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreePath {
    pub side: Side,
    pub path: Utf8PathBuf,
}

impl TreePath {
    pub fn source(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            side: Side::Source,
            path: path.into(),
        }
    }

    pub fn target(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            side: Side::Target,
            path: path.into(),
        }
    }

    /// Same tree, and one path equals or contains the other
    pub fn overlaps(&self, other: &TreePath) -> bool {
        self.side == other.side && paths_overlap(&self.path, &other.path)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Source => "source",
            Side::Target => "target",
        };
        write!(f, "{}:{}", side, self.path)
    }
}

/// True when `a == b`, or either is an ancestor directory of the other
pub fn paths_overlap(a: &Utf8Path, b: &Utf8Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// One filesystem step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a directory (and any missing parents)
    CreateDir { path: TreePath },

    /// Rename/relocate a file
    Move { from: TreePath, to: TreePath },

    /// Copy file content
    Copy { from: TreePath, to: TreePath },

    /// Remove a file, or an empty directory
    Delete { path: TreePath },
}

impl Operation {
    /// Short label used for progress and reports
    pub fn action_name(&self) -> &'static str {
        match self {
            Operation::CreateDir { .. } => "CreateDir",
            Operation::Move { .. } => "Move",
            Operation::Copy { .. } => "Copy",
            Operation::Delete { .. } => "Delete",
        }
    }

    /// The path this operation creates or replaces, if any
    pub fn destination(&self) -> Option<&TreePath> {
        match self {
            Operation::Move { to, .. } | Operation::Copy { to, .. } => Some(to),
            Operation::CreateDir { .. } | Operation::Delete { .. } => None,
        }
    }

    /// Primary path for display: the written path, or the deleted/created one
    pub fn path(&self) -> &TreePath {
        match self {
            Operation::CreateDir { path } | Operation::Delete { path } => path,
            Operation::Move { to, .. } | Operation::Copy { to, .. } => to,
        }
    }

    /// Every path this operation reads or mutates
    pub fn touched_paths(&self) -> Vec<&TreePath> {
        match self {
            Operation::CreateDir { path } | Operation::Delete { path } => vec![path],
            Operation::Move { from, to } | Operation::Copy { from, to } => vec![from, to],
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self, Operation::Move { .. })
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Operation::Copy { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateDir { path } => write!(f, "MKDIR     {}", path),
            Operation::Move { from, to } => write!(f, "MOVE      {} -> {}", from, to),
            Operation::Copy { from, to } => write!(f, "COPY      {} -> {}", from, to),
            Operation::Delete { path } => write!(f, "DELETE    {}", path),
        }
    }
}
