//! Command implementations

pub mod sync;

pub use sync::{run, RunReport, TreeScanSummary, EXIT_FAILURES, EXIT_FATAL, EXIT_SUCCESS};
