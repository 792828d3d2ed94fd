//! Progress reporting

use crate::executor::ExecutionStats;
use crate::types::{Side, TreePath};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress reporter for a reconciliation run
///
/// Both trees scan concurrently, so each side owns a spinner inside one
/// `MultiProgress`.
pub struct ProgressReporter {
    multi: MultiProgress,
    source_bar: ProgressBar,
    target_bar: ProgressBar,
    apply_bar: ProgressBar,
    apply_started_at: Option<Instant>,
    transferred_bytes: u64,
}

impl ProgressReporter {
    /// Create a new progress reporter drawing to stderr
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// A reporter that draws nothing (JSON output, tests)
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let source_bar = multi.add(scan_spinner());
        let target_bar = multi.add(scan_spinner());

        // Joins the MultiProgress once the apply phase starts
        let apply_bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        if let Ok(style) =
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} operations | {msg}")
        {
            apply_bar.set_style(style.progress_chars("=>-"));
        }

        Self {
            multi,
            source_bar,
            target_bar,
            apply_bar,
            apply_started_at: None,
            transferred_bytes: 0,
        }
    }

    /// Spinner for one side; cheap to clone into scan callbacks
    pub fn scan_bar(&self, side: Side) -> ProgressBar {
        match side {
            Side::Source => self.source_bar.clone(),
            Side::Target => self.target_bar.clone(),
        }
    }

    /// Mark start of a scanning phase
    pub fn start_scan(&self, side: Side) {
        let bar = self.scan_bar(side);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(format!("Scanning {}...", side_label(side)));
    }

    /// Update scanning progress counters
    pub fn update_scan(bar: &ProgressBar, side: Side, files: u64, bytes: u64) {
        bar.set_message(format!(
            "Scanning {}... {} files | {}",
            side_label(side),
            files,
            HumanBytes(bytes)
        ));
    }

    /// Mark completion of a scanning phase
    pub fn finish_scan(&self, side: Side, files: usize, bytes: u64) {
        self.scan_bar(side).finish_with_message(format!(
            "Scanned {}: {} files | {}",
            side_label(side),
            files,
            HumanBytes(bytes)
        ));
    }

    /// Initialize the apply phase
    pub fn start_apply(&mut self, total_operations: u64) {
        self.apply_started_at = Some(Instant::now());
        self.transferred_bytes = 0;
        let bar = self.multi.add(self.apply_bar.clone());
        bar.set_length(total_operations);
        bar.set_position(0);
        bar.set_message("Starting...".to_string());
    }

    /// Update current operation indicator
    pub fn set_current(&self, action: &str, path: &TreePath) {
        self.apply_bar.set_message(format!("{} {}", action, path));
    }

    /// Mark one operation done and refresh throughput display
    pub fn complete_operation(&mut self, bytes: u64) {
        self.transferred_bytes = self.transferred_bytes.saturating_add(bytes);
        self.apply_bar.inc(1);

        let throughput = self.current_throughput_bps();
        self.apply_bar.set_message(format!(
            "{} copied | {}/s",
            HumanBytes(self.transferred_bytes),
            HumanBytes(throughput)
        ));
    }

    /// Surface an operation error or skip without breaking the bar
    pub fn operation_problem(&self, label: &str, action: &str, path: &TreePath, detail: &str) {
        self.apply_bar.inc(1);
        self.apply_bar
            .println(format!("{} {} {}: {}", label, action, path, detail));
    }

    /// Finalize the apply phase
    pub fn finish_apply(&self, stats: &ExecutionStats) {
        let throughput = self.current_throughput_bps();
        self.apply_bar.finish_with_message(format!(
            "Operations complete: {} succeeded, {} failed, {} skipped | {} copied | {}/s",
            stats.succeeded,
            stats.failed,
            stats.skipped,
            HumanBytes(stats.bytes_copied),
            HumanBytes(throughput)
        ));
    }

    fn current_throughput_bps(&self) -> u64 {
        match self.apply_started_at {
            Some(started) => {
                let secs = started.elapsed().as_secs_f64();
                if secs > 0.0 {
                    (self.transferred_bytes as f64 / secs) as u64
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn scan_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    bar
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Source => "source",
        Side::Target => "target",
    }
}
