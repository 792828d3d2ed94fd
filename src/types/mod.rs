//! Core type definitions for shiftsync

mod entry;
mod error;
mod operation;
mod snapshot;

pub use entry::FileEntry;
pub use error::SyncError;
pub use operation::{paths_overlap, Operation, Side, SyncMode, TreePath};
pub use snapshot::Snapshot;
