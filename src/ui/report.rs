//! Run report printer (text or JSON, stdout)

use crate::commands::sync::{RunReport, TreeScanSummary};
use crate::executor::Outcome;
use crate::types::SyncError;
use console::style;
use indicatif::HumanBytes;
use std::io::Write;

/// Rough copy throughput used for the plan's time estimate
const ESTIMATE_BYTES_PER_SECOND: u64 = 100 * 1024 * 1024;

/// Print the report to stdout, as pretty JSON when `json` is set
pub fn print_report(report: &RunReport, json: bool) -> Result<(), SyncError> {
    let rendered = if json {
        serde_json::to_string_pretty(report)
            .map_err(|e| SyncError::Validation(format!("cannot serialize report: {}", e)))?
    } else {
        format_report(report)
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", rendered)?;
    Ok(())
}

/// Human-readable rendering of a run report
pub fn format_report(report: &RunReport) -> String {
    let mut lines = Vec::new();

    let mode = match report.mode {
        crate::types::SyncMode::Mirror => "mirror",
        crate::types::SyncMode::Move => "move",
    };
    let header = if report.dry_run {
        format!("shiftsync {} (dry run)", mode)
    } else {
        format!("shiftsync {}", mode)
    };
    lines.push(style(header).bold().to_string());

    lines.push(String::new());
    lines.push("Scan:".to_string());
    lines.push(format_scan_line("source", &report.source));
    if let Some(target) = &report.target {
        lines.push(format_scan_line("target", target));
    }

    let unreadable: Vec<_> = report
        .source
        .failures
        .iter()
        .chain(report.target.iter().flat_map(|t| t.failures.iter()))
        .collect();
    if !unreadable.is_empty() {
        lines.push(style("Unreadable files:").yellow().to_string());
        for failure in unreadable {
            lines.push(format!("  {}: {}", failure.path.display(), failure.reason));
        }
    }

    if let Some(summary) = &report.summary {
        lines.push(String::new());
        lines.push(format!(
            "Classification: {} unchanged, {} moved, {} added, {} removed, {} modified",
            summary.unchanged, summary.moved, summary.added, summary.removed, summary.modified
        ));
    }

    lines.push(String::new());
    let stats = &report.plan.stats;
    if report.plan.is_empty() {
        lines.push("Plan: nothing to do".to_string());
    } else {
        lines.push(format!(
            "Plan: {} operation(s) | {} moves, {} copies, {} deletes, {} dirs | {} to copy (~{})",
            report.plan.len(),
            stats.move_count,
            stats.copy_count,
            stats.delete_count,
            stats.create_dir_count,
            HumanBytes(stats.bytes_to_copy),
            stats.estimate_duration_human(ESTIMATE_BYTES_PER_SECOND)
        ));
        for outcome in &report.execution.outcomes {
            let marker = match &outcome.outcome {
                Outcome::Succeeded => style("ok  ").green(),
                Outcome::Failed { .. } => style("FAIL").red(),
                Outcome::Skipped { .. } if report.dry_run => style("    "),
                Outcome::Skipped { .. } => style("SKIP").yellow(),
            };
            lines.push(format!("  {} {}", marker, outcome.operation));
        }
    }

    lines.push(String::new());
    let exec = &report.execution.stats;
    if report.dry_run {
        lines.push("Dry-run mode: no changes were made. Re-run with --execute to apply.".to_string());
    } else {
        lines.push(format!(
            "Result: {} succeeded, {} failed, {} skipped | {} copied",
            exec.succeeded,
            exec.failed,
            exec.skipped,
            HumanBytes(exec.bytes_copied)
        ));
        let failures: Vec<_> = report.execution.failures().collect();
        if !failures.is_empty() {
            lines.push(style("Failures:").red().to_string());
            for (operation, reason) in failures {
                lines.push(format!("  {}: {}", operation, reason));
            }
        }
    }

    lines.join("\n")
}

fn format_scan_line(label: &str, scan: &TreeScanSummary) -> String {
    let mut line = format!(
        "  {}: {} files, {} dirs, {} in {}ms ({})",
        label,
        scan.files,
        scan.directories,
        HumanBytes(scan.bytes),
        scan.elapsed_ms,
        scan.root.display()
    );
    if !scan.failures.is_empty() {
        line.push_str(&format!(", {} unreadable", scan.failures.len()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ClassificationSummary, Plan};
    use crate::executor::{DryRunExecutor, Executor, ExecutionReport};
    use crate::scanner::ScanFailure;
    use crate::types::{Operation, SyncMode, TreePath};
    use std::path::PathBuf;

    fn scan(root: &str, files: usize) -> TreeScanSummary {
        TreeScanSummary {
            root: PathBuf::from(root),
            files,
            directories: 1,
            bytes: 5 * 1024 * 1024,
            elapsed_ms: 12,
            failures: Vec::new(),
        }
    }

    fn report_with(plan: Plan, execution: ExecutionReport, dry_run: bool) -> RunReport {
        RunReport {
            mode: SyncMode::Mirror,
            dry_run,
            source: scan("/s", 3),
            target: Some(scan("/t", 2)),
            summary: Some(ClassificationSummary {
                unchanged: 1,
                moved: 1,
                added: 1,
                ..Default::default()
            }),
            classification: None,
            plan,
            execution,
        }
    }

    fn sample_plan() -> Plan {
        let mut plan = Plan::new(SyncMode::Mirror, PathBuf::from("/s"), PathBuf::from("/t"));
        plan.add_operation(
            Operation::Move {
                from: TreePath::target("old.txt"),
                to: TreePath::target("new.txt"),
            },
            10,
        );
        plan.add_operation(
            Operation::Copy {
                from: TreePath::source("added.bin"),
                to: TreePath::target("added.bin"),
            },
            5 * 1024 * 1024,
        );
        plan
    }

    #[test]
    fn test_dry_run_report_lists_operations() {
        console::set_colors_enabled(false);
        let plan = sample_plan();
        let execution = DryRunExecutor::new().apply(&plan);
        let text = format_report(&report_with(plan, execution, true));

        assert!(text.contains("shiftsync mirror (dry run)"));
        assert!(text.contains("Classification: 1 unchanged, 1 moved, 1 added"));
        assert!(text.contains("MOVE      target:old.txt -> target:new.txt"));
        assert!(text.contains("5.00 MiB to copy"));
        assert!(text.contains("no changes were made"));
    }

    #[test]
    fn test_empty_plan_says_nothing_to_do() {
        console::set_colors_enabled(false);
        let plan = Plan::new(SyncMode::Mirror, PathBuf::from("/s"), PathBuf::from("/t"));
        let text = format_report(&report_with(plan, ExecutionReport::default(), false));

        assert!(text.contains("Plan: nothing to do"));
        assert!(text.contains("Result: 0 succeeded, 0 failed, 0 skipped"));
    }

    #[test]
    fn test_scan_failures_are_listed() {
        console::set_colors_enabled(false);
        let mut report = report_with(
            Plan::new(SyncMode::Mirror, PathBuf::from("/s"), PathBuf::from("/t")),
            ExecutionReport::default(),
            true,
        );
        report.source.failures.push(ScanFailure {
            path: PathBuf::from("/s/locked.txt"),
            reason: "Permission denied".to_string(),
        });

        let text = format_report(&report);
        assert!(text.contains("1 unreadable"));
        assert!(text.contains("/s/locked.txt: Permission denied"));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let plan = sample_plan();
        let execution = DryRunExecutor::new().apply(&plan);
        let report = report_with(plan, execution, true);

        let json = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(json["mode"], "mirror");
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["plan"]["operations"][0]["op"], "move");
        assert_eq!(json["execution"]["outcomes"][1]["status"], "skipped");
        assert_eq!(json["summary"]["moved"], 1);
    }
}
