//! takeout-tidy - Tidy up an exported photo library
//!
//! Command-line front end over the date resolver, the duplicate resolver
//! and the album normalizer.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use takeout_tidy::fsops::collect_media_files;
use takeout_tidy::{
    AlbumNormalizer, AlbumOutcome, Cli, Command, Config, DateIndex, DateResolver, DuplicateAction,
    DuplicateResolver,
};
use tracing::{Level, error, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// CLI Output Module
mod cli_output {
    //! Colored summary output for the terminal

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    /// CLI theme colors
    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(&format!("{}\n", "─".repeat(60))));
    }

    /// Centered, boxed title
    pub fn print_title(title: &str) {
        let width: usize = 60;
        let padding = width.saturating_sub(title.len()) / 2;
        let left_pad = " ".repeat(padding.saturating_sub(1));

        let _ = stdout().execute(Print(&format!(
            "{}{} {}{}\n",
            left_pad,
            "╔".bold(),
            title.bold(),
            "╗".bold(),
        )));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_hint(msg: &str) {
        let _ = stdout().execute(Print(style("→ ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_stat(key: &str, value: usize, color: Color) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = style(value.to_string()).with(color).bold();
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// One result line: icon, subject, detail
    pub fn print_result(status_icon: &str, status_color: Color, source: &str, detail: &str) {
        let icon_styled = style(status_icon).with(status_color).bold();
        let source_styled = style(source).italic();
        let detail_styled = style(detail).with(CliTheme::HINT);

        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(icon_styled));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(source_styled));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(detail_styled));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_log_path(path: &str) {
        let _ = stdout().execute(Print("\n"));
        let _ = stdout().execute(Print(style("  Log file: ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

use cli_output::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Get the executable directory for Config and Log directories
    let exe_dir = get_executable_dir()?;
    let log_path = get_log_path(&exe_dir, &cli);
    let _guard = setup_logging(&cli, &log_path)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = cli.command.log_name(),
        "takeout-tidy starting"
    );

    let config = load_config(&cli, &exe_dir)?;
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }
    info!(log_file = %log_path.display(), "Log file location");

    match run_command(&cli, &config) {
        Ok(()) => {
            print_separator();
            print_log_path(&log_path.display().to_string());
            info!(log_file = %log_path.display(), "Run complete. Log saved to");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            print_error(&format!("Error: {:#}", e));
            std::process::exit(1);
        }
    }
}

fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Command::Dates { paths, refresh, .. } => run_dates(config, paths, *refresh),
        Command::Duplicates { roots, action, .. } => run_duplicates(cli, config, roots, *action),
        Command::Revise { report } => run_revise(config, report),
        Command::Albums { parent, .. } => run_albums(cli, config, parent),
    }
}

fn run_dates(config: &Config, paths: &[PathBuf], refresh: bool) -> Result<()> {
    let files = collect_media_files(paths, &config.media, &[]);
    let resolver = DateResolver::new(config.dates.clone(), config.threads)?;
    if !resolver.tool_available() {
        print_warning("exiftool not found, using the embedded EXIF reader");
    }

    let index = if refresh {
        let mut index = load_index(config)?;
        let resolved = resolver.refresh(&mut index, &files);
        info!(resolved, cached = files.len() - resolved, "Refreshed date index");
        index
    } else {
        resolver.resolve(&files)
    };
    save_index(config, &index)?;

    print_separator();
    print_title("Capture dates resolved");
    print_separator();
    print_blank();
    print_stat("Files", files.len(), CliTheme::ACCENT);
    for (source, count) in index.summary() {
        let color = if source.is_fallback_only() {
            CliTheme::WARNING
        } else if source == takeout_tidy::DateSource::Unresolved {
            CliTheme::ERROR
        } else {
            CliTheme::SUCCESS
        };
        print_stat(source.tag_name(), count, color);
    }
    print_blank();

    if config.index_file.is_none() {
        print_hint("No index file configured, dates were not persisted (use --index)");
    }
    Ok(())
}

/// Resolve dates for whatever the loaded index does not cover yet
fn refreshed_index(config: &Config, roots: &[PathBuf], exclude: &[PathBuf]) -> Result<DateIndex> {
    let mut index = load_index(config)?;
    let files = collect_media_files(roots, &config.media, exclude);
    let resolver = DateResolver::new(config.dates.clone(), config.threads)?;
    resolver.refresh(&mut index, &files);
    Ok(index)
}

fn run_duplicates(cli: &Cli, config: &Config, roots: &[PathBuf], action: DuplicateAction) -> Result<()> {
    let resolver = DuplicateResolver::new(
        config.duplicates.clone(),
        config.media.clone(),
        config.threads,
    )?
    .with_span(info_span!("duplicates", %action));

    let holding = resolver.holding_dir(roots);
    let mut index = refreshed_index(config, roots, std::slice::from_ref(&holding))?;
    let report = resolver.run(roots, action, &mut index)?;
    save_index(config, &index)?;

    let stats = &report.stats;
    print_separator();
    print_title("Duplicate resolution complete");
    print_separator();
    print_blank();
    print_stat("Files scanned", stats.scanned, CliTheme::ACCENT);
    print_stat("Duplicate groups", stats.groups, CliTheme::ACCENT);
    print_stat("Duplicates", stats.duplicates, CliTheme::WARNING);
    print_stat("Moved", stats.moved, CliTheme::SUCCESS);
    print_stat("Removed", stats.removed, CliTheme::SUCCESS);
    print_stat("Empty folders pruned", stats.pruned_dirs, CliTheme::SUCCESS);
    print_stat("Failed", stats.failed, CliTheme::ERROR);
    print_blank();

    if cli.verbose {
        print_separator();
        for group in &report.groups {
            let principal = group.principal();
            print_result(
                "★",
                CliTheme::SUCCESS,
                &principal.record.path.display().to_string(),
                &format!("[{}]", group.id),
            );
            for member in group.duplicates() {
                print_result(
                    "≡",
                    CliTheme::ACCENT,
                    &member.record.path.display().to_string(),
                    &member.notes,
                );
            }
        }
        print_blank();
    }

    print_hint(&format!("Report: {}", report.report_path.display()));
    if action == DuplicateAction::List {
        print_warning("List mode: nothing was changed");
    }
    Ok(())
}

fn run_revise(config: &Config, report: &Path) -> Result<()> {
    let resolver = DuplicateResolver::new(
        config.duplicates.clone(),
        config.media.clone(),
        config.threads,
    )?;

    let mut index = load_index(config)?;
    let stats = resolver.revise(report, &mut index)?;
    save_index(config, &index)?;

    print_separator();
    print_title("Report replayed");
    print_separator();
    print_blank();
    print_stat("Removed", stats.removed, CliTheme::SUCCESS);
    print_stat("Restored", stats.restored, CliTheme::SUCCESS);
    print_stat("Replaced", stats.replaced, CliTheme::SUCCESS);
    print_stat("Skipped", stats.skipped, CliTheme::WARNING);
    print_stat("Unknown actions", stats.unknown, CliTheme::WARNING);
    print_stat("Failed", stats.failed, CliTheme::ERROR);
    print_stat("Empty folders pruned", stats.pruned_dirs, CliTheme::SUCCESS);
    print_blank();
    Ok(())
}

fn run_albums(cli: &Cli, config: &Config, parent: &Path) -> Result<()> {
    let normalizer = AlbumNormalizer::new(config.albums.clone(), config.media.clone())?;

    let mut index = refreshed_index(config, &[parent.to_path_buf()], &[])?;
    let report = normalizer.run(parent, &mut index)?;
    save_index(config, &index)?;

    let stats = &report.stats;
    print_separator();
    print_title("Album normalization complete");
    print_separator();
    print_blank();
    print_stat("Folders", stats.folders, CliTheme::ACCENT);
    print_stat("Renamed", stats.renamed, CliTheme::SUCCESS);
    print_stat("Fully merged", stats.fully_merged, CliTheme::SUCCESS);
    print_stat("Partially merged", stats.partially_merged, CliTheme::WARNING);
    print_stat("Unchanged", stats.unchanged, CliTheme::HINT);
    print_stat("Excluded", stats.excluded, CliTheme::HINT);
    print_stat("Planned", stats.planned, CliTheme::ACCENT);
    print_stat("Failed", stats.failed, CliTheme::ERROR);
    print_blank();

    if cli.verbose || config.albums.dry_run {
        print_separator();
        for folder in &report.folders {
            let (icon, color) = match folder.outcome {
                AlbumOutcome::Renamed | AlbumOutcome::FullyMerged => ("✓", CliTheme::SUCCESS),
                AlbumOutcome::Planned => ("~", CliTheme::ACCENT),
                AlbumOutcome::PartiallyMerged => ("⊘", CliTheme::WARNING),
                AlbumOutcome::Failed => ("✗", CliTheme::ERROR),
                AlbumOutcome::Unchanged | AlbumOutcome::Excluded => continue,
            };
            print_result(icon, color, &folder.original_name, &format!("→ {}", folder.new_name));
        }
        print_blank();
    }

    if config.albums.dry_run {
        print_warning("Dry run: no folder was renamed");
    }
    Ok(())
}

fn load_index(config: &Config) -> Result<DateIndex> {
    match &config.index_file {
        Some(path) => Ok(DateIndex::load(path)?),
        None => Ok(DateIndex::new()),
    }
}

fn save_index(config: &Config, index: &DateIndex) -> Result<()> {
    if let Some(path) = &config.index_file {
        index.save(path)?;
    }
    Ok(())
}

/// Get the directory where the executable is located
fn get_executable_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()?;
    Ok(exe_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Log file path: `Log/<Command>_<timestamp>.log`, grouped per config file
fn get_log_path(exe_dir: &Path, cli: &Cli) -> PathBuf {
    let log_dir = exe_dir.join("Log");
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}_{}.log", cli.command.log_name(), timestamp);

    match cli.config_name() {
        Some(config_name) => log_dir.join(config_name).join(log_filename),
        None => log_dir.join(log_filename),
    }
}

/// Resolve config path - supports shorthand syntax
fn resolve_config_path(exe_dir: &Path, config_path: &Path) -> PathBuf {
    if config_path.exists() {
        return config_path.to_path_buf();
    }

    let with_extension = if config_path.extension().is_none() {
        config_path.with_extension("toml")
    } else {
        config_path.to_path_buf()
    };

    if with_extension.exists() {
        return with_extension;
    }

    let config_dir = exe_dir.join("Config");
    let filename = config_path.file_name().unwrap_or(config_path.as_os_str());

    let mut in_config_dir = config_dir.join(filename);
    if in_config_dir.extension().is_none() {
        in_config_dir = in_config_dir.with_extension("toml");
    }

    if in_config_dir.exists() {
        return in_config_dir;
    }

    config_path.to_path_buf()
}

/// Load configuration from file or CLI arguments, then validate it
fn load_config(cli: &Cli, exe_dir: &Path) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        let resolved_path = resolve_config_path(exe_dir, config_path);
        info!(config_file = %resolved_path.display(), "Loading configuration from file");
        let file_config = Config::load_from_file(&resolved_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    config.validate()?;
    Ok(config)
}

/// Setup logging (file + console)
fn setup_logging(cli: &Cli, log_path: &Path) -> Result<WorkerGuard> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(guard)
}
