//! Configuration management

use crate::types::{SyncError, SyncMode};
use clap::{ArgAction, Parser};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default fingerprint cache file, relative to the working directory
pub const DEFAULT_CACHE_FILE: &str = "shiftsync-cache.json";

/// Global configuration for shiftsync
#[derive(Debug, Clone)]
pub struct Config {
    /// Source directory (the layout to reproduce)
    pub source: PathBuf,

    /// Target directory (the tree being reconciled)
    pub target: PathBuf,

    /// Mirror or one-way move
    pub mode: SyncMode,

    /// Only list operations, never perform them
    pub dry_run: bool,

    /// Fingerprint cache file; `None` keeps the cache in memory only
    pub cache_path: Option<PathBuf>,

    /// Worker threads for scanning and hashing
    pub threads: usize,

    /// Exclude patterns (globs, matched against relative paths)
    pub exclude_patterns: Vec<String>,

    /// Print the final report as JSON
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            target: PathBuf::new(),
            mode: SyncMode::Mirror,
            dry_run: true,
            cache_path: None,
            threads: 4,
            exclude_patterns: Vec::new(),
            json: false,
        }
    }
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), SyncError> {
        if !self.source.is_dir() {
            return Err(SyncError::Config(format!(
                "Source path does not exist or is not a directory: {:?}",
                self.source
            )));
        }

        if self.target.exists() && !self.target.is_dir() {
            return Err(SyncError::Config(format!(
                "Target path is not a directory: {:?}",
                self.target
            )));
        }

        let source = absolute(&self.source);
        let target = absolute(&self.target);
        if source == target {
            return Err(SyncError::Config(
                "Source and target cannot be the same".to_string(),
            ));
        }
        if target.starts_with(&source) || source.starts_with(&target) {
            return Err(SyncError::Config(
                "Source and target cannot be nested inside one another".to_string(),
            ));
        }

        if self.threads == 0 {
            return Err(SyncError::Config("threads must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(name = "shiftsync", version, about = "Rename-aware directory mirroring")]
pub struct Cli {
    /// Source directory
    pub source: Option<PathBuf>,

    /// Target directory
    pub target: Option<PathBuf>,

    /// Reconciliation mode
    #[arg(long, value_enum)]
    pub mode: Option<SyncMode>,

    /// Perform the planned operations (default is a dry run)
    #[arg(long)]
    pub execute: bool,

    /// Fingerprint cache location
    #[arg(long, value_name = "PATH", conflicts_with = "no_cache")]
    pub cache: Option<PathBuf>,

    /// Keep fingerprints in memory only
    #[arg(long)]
    pub no_cache: bool,

    /// TOML file providing defaults for any of these options
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads for scanning and hashing
    #[arg(long, short = 'j')]
    pub threads: Option<usize>,

    /// Exclude paths matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Options accepted in a `--config` TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub mode: Option<SyncMode>,
    pub dry_run: Option<bool>,
    pub cache: Option<PathBuf>,
    pub threads: Option<usize>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FileConfig {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read config file {:?}: {}", path, e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("Invalid config file {:?}: {}", path, e)))
    }
}

impl TryFrom<Cli> for Config {
    type Error = SyncError;

    /// Merge file defaults with CLI flags (CLI wins) and validate
    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let source = cli
            .source
            .or(file.source)
            .ok_or_else(|| SyncError::Config("No source directory given".to_string()))?;
        let target = cli
            .target
            .or(file.target)
            .ok_or_else(|| SyncError::Config("No target directory given".to_string()))?;

        let cache_path = if cli.no_cache {
            None
        } else {
            Some(
                cli.cache
                    .or(file.cache)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE)),
            )
        };

        let mut exclude_patterns = file.exclude;
        exclude_patterns.extend(cli.exclude);

        let defaults = Config::default();
        let config = Config {
            source,
            target,
            mode: cli.mode.or(file.mode).unwrap_or(defaults.mode),
            dry_run: if cli.execute {
                false
            } else {
                file.dry_run.unwrap_or(defaults.dry_run)
            },
            cache_path,
            threads: cli.threads.or(file.threads).unwrap_or(defaults.threads),
            exclude_patterns,
            json: cli.json,
        };

        config.validate()?;
        Ok(config)
    }
}
