use anyhow::Context;
use clap::Parser;
use shiftsync::commands::{self, EXIT_FATAL};
use shiftsync::config::Cli;
use shiftsync::{logging, ui, Config};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(cli.verbose) {
        eprintln!("warning: {}", err);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    // Convert CLI args to Config - this validates immediately
    let config = Config::try_from(cli).context("invalid configuration")?;
    tracing::debug!(?config, "configuration validated");

    let report = commands::run(&config).context("reconciliation aborted")?;
    ui::print_report(&report, config.json).context("cannot write report")?;
    Ok(report.exit_code())
}
