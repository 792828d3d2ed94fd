//! # shiftsync - rename-aware directory reconciliation
//!
//! Scans a source and a target tree, matches files by content identity, and
//! plans the moves, copies, and deletes that make the target reproduce the
//! source. Renamed or relocated files are moved in place instead of being
//! deleted and copied again.
//!
//! Pipeline: [`scanner`] → [`diff::classify`] → [`diff::plan_mirror`] /
//! [`diff::plan_move`] → [`executor::Executor`].

pub mod cache;
pub mod commands;
pub mod config;
pub mod diff;
pub mod executor;
pub mod hash;
pub mod logging;
pub mod scanner;
pub mod types;
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use types::{FileEntry, Operation, Snapshot, SyncError, SyncMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
