//! Terminal output: progress bars and the run report printer

mod progress;
mod report;

pub use progress::ProgressReporter;
pub use report::{format_report, print_report};
