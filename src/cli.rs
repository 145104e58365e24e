//! CLI argument parsing with clap

use crate::config::{Config, Granularity};
use crate::duplicates::DuplicateAction;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// takeout-tidy - Tidy up an exported photo library
///
/// Resolves capture dates from conflicting metadata, resolves duplicate
/// copies across album and catch-all folders, and gives album folders
/// date-prefixed names.
#[derive(Parser, Debug)]
#[command(name = "takeout-tidy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of worker threads (0 = twice the CPU count)
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Persisted date index to load before and save after the run
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long, global = true)]
    pub json_log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a capture date for every photo and video
    Dates {
        /// Files or folders to scan
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// exiftool binary
        #[arg(long, env = "TAKEOUT_TIDY_EXIFTOOL")]
        exiftool: Option<PathBuf>,

        /// Only resolve files the loaded index does not know yet
        #[arg(long)]
        refresh: bool,
    },

    /// Find duplicates across priority-ordered roots and apply an action
    Duplicates {
        /// Root folders, highest priority first
        #[arg(required = true, num_args = 1..)]
        roots: Vec<PathBuf>,

        /// What to do with the non-principal copies
        #[arg(short, long, value_enum, default_value_t = DuplicateAction::List)]
        action: DuplicateAction,

        /// Holding area for moved duplicates
        #[arg(long)]
        holding_dir: Option<PathBuf>,

        /// Report file location
        #[arg(long)]
        report: Option<PathBuf>,

        /// Extra deprioritized folder-name pattern (regex, repeatable)
        #[arg(long = "deprioritize")]
        deprioritize: Vec<String>,
    },

    /// Replay an edited duplicate report
    Revise {
        /// Report written by a previous `duplicates` run
        report: PathBuf,
    },

    /// Give album folders date-prefixed, cleaned names
    Albums {
        /// Folder that holds the album folders
        parent: PathBuf,

        /// Date granularity of the prefix
        #[arg(short, long, value_enum)]
        granularity: Option<Granularity>,

        /// Extra folder name to leave untouched (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Dry run mode - show what would be done without doing it
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

impl Command {
    /// Name used for log files
    pub fn log_name(&self) -> &'static str {
        match self {
            Command::Dates { .. } => "Dates",
            Command::Duplicates { .. } => "Duplicates",
            Command::Revise { .. } => "Revise",
            Command::Albums { .. } => "Albums",
        }
    }
}

impl Cli {
    /// Get config file name (without extension) for log naming
    pub fn config_name(&self) -> Option<String> {
        self.config.as_ref().and_then(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
    }

    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        config.dates = config.dates.with_env_overrides();

        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(ref index) = self.index {
            config.index_file = Some(index.clone());
        }

        match &self.command {
            Command::Dates { exiftool, .. } => {
                if let Some(exiftool) = exiftool {
                    config.dates.exiftool_path = exiftool.clone();
                }
            }
            Command::Duplicates {
                holding_dir,
                report,
                deprioritize,
                ..
            } => {
                if let Some(holding_dir) = holding_dir {
                    config.duplicates.holding_dir = Some(holding_dir.clone());
                }
                if let Some(report) = report {
                    config.duplicates.report_file = Some(report.clone());
                }
                config
                    .duplicates
                    .deprioritized_patterns
                    .extend(deprioritize.iter().cloned());
            }
            Command::Revise { .. } => {}
            Command::Albums {
                granularity,
                exclude,
                dry_run,
                ..
            } => {
                if let Some(granularity) = granularity {
                    config.albums.granularity = *granularity;
                }
                config.albums.exclude.extend(exclude.iter().cloned());
                if *dry_run {
                    config.albums.dry_run = true;
                }
            }
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}
