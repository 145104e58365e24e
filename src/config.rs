//! Configuration types for takeout-tidy

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured exiftool binary
pub const EXIFTOOL_ENV: &str = "TAKEOUT_TIDY_EXIFTOOL";

/// Date granularity used when prefixing album folder names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Day-level ranges: `2021.05.03`, `2021.05`, `2021`, `2019-2021`
    #[default]
    Complete,
    /// Year-level ranges only: `2021`, `2019-2021`
    Year,
}

/// Settings for the date resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// Batch metadata tool binary
    pub exiftool_path: PathBuf,

    /// Number of paths handed to one tool invocation
    pub block_size: usize,

    /// Candidates dated before January 1st of this year are rejected
    pub floor_year: i32,

    /// Candidates later than the reference time plus this slack are rejected
    pub future_slack_hours: i64,

    /// Fixed reference timestamp for the validity window (defaults to run start)
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            exiftool_path: PathBuf::from("exiftool"),
            block_size: 10_000,
            floor_year: 1900,
            future_slack_hours: 24,
            reference_time: None,
        }
    }
}

impl DateConfig {
    /// Apply the environment override for the exiftool binary
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(tool) = std::env::var(EXIFTOOL_ENV)
            && !tool.trim().is_empty()
        {
            self.exiftool_path = PathBuf::from(tool);
        }
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::Config("dates.block_size must be > 0".into()));
        }
        if self.future_slack_hours < 0 {
            return Err(crate::Error::Config(
                "dates.future_slack_hours must not be negative".into(),
            ));
        }
        let reference_year = self.reference_time.unwrap_or_else(Utc::now).year();
        if self.floor_year > reference_year {
            return Err(crate::Error::Config(format!(
                "dates.floor_year {} is after the reference year {}",
                self.floor_year, reference_year
            )));
        }
        Ok(())
    }
}

/// Settings for the duplicate resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Folder name marking album-type subtrees
    pub albums_folder: String,

    /// Folder name marking the catch-all subtree
    pub catch_all_folder: String,

    /// Regexes matched against a file's immediate parent folder name
    pub deprioritized_patterns: Vec<String>,

    /// Side holding area for moved duplicates (defaults next to the first root)
    pub holding_dir: Option<PathBuf>,

    /// Report location (defaults inside the holding area)
    pub report_file: Option<PathBuf>,

    /// Bytes read for the quick pre-hash
    pub prefix_bytes: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            albums_folder: "Albums".into(),
            catch_all_folder: "No-Albums".into(),
            deprioritized_patterns: vec![
                r"(?i)^photos from \d{4}$".into(),
                r"(?i)^misc(ellaneous)?$".into(),
                r"(?i)^untitled( album)?( \d+)?$".into(),
                r"(?i)^(all[ _]photos|archive|trash|bin)$".into(),
            ],
            holding_dir: None,
            report_file: None,
            prefix_bytes: 64 * 1024,
        }
    }
}

impl DuplicateConfig {
    /// Compile the deprioritized folder patterns
    pub fn compiled_patterns(&self) -> crate::Result<Vec<Regex>> {
        self.deprioritized_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(crate::Error::from))
            .collect()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.albums_folder.trim().is_empty() || self.catch_all_folder.trim().is_empty() {
            return Err(crate::Error::Config(
                "duplicates.albums_folder and duplicates.catch_all_folder must be set".into(),
            ));
        }
        if self.prefix_bytes == 0 {
            return Err(crate::Error::Config("duplicates.prefix_bytes must be > 0".into()));
        }
        self.compiled_patterns()?;
        Ok(())
    }
}

/// Settings for the album normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumConfig {
    /// Folder names that are never renamed
    pub exclude: Vec<String>,

    /// Date granularity of the computed prefix
    pub granularity: Granularity,

    /// Only report the planned renames
    pub dry_run: bool,
}

impl Default for AlbumConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["No-Albums".into()],
            granularity: Granularity::default(),
            dry_run: false,
        }
    }
}

impl AlbumConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.exclude.iter().any(|name| name.contains(['/', '\\'])) {
            return Err(crate::Error::Config(
                "albums.exclude holds folder names, not paths".into(),
            ));
        }
        Ok(())
    }
}

/// Extension lists shared by the components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaTypes {
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub raw_extensions: Vec<String>,
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self {
            image_extensions: vec![
                "jpg".into(), "jpeg".into(), "png".into(), "gif".into(),
                "bmp".into(), "webp".into(), "heic".into(), "heif".into(),
                "avif".into(), "tiff".into(), "tif".into(),
            ],
            video_extensions: vec![
                "mp4".into(), "mov".into(), "avi".into(), "mkv".into(),
                "wmv".into(), "flv".into(), "m4v".into(), "3gp".into(),
                "mts".into(), "m2ts".into(),
            ],
            raw_extensions: vec![
                "raw".into(), "arw".into(), "cr2".into(), "cr3".into(),
                "nef".into(), "orf".into(), "rw2".into(), "dng".into(),
                "raf".into(), "srw".into(), "pef".into(),
            ],
        }
    }
}

impl MediaTypes {
    /// Check if a file extension is a supported image format (RAW included)
    pub fn is_image(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.image_extensions.iter().any(|e| e == &ext_lower)
            || self.raw_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a file extension is a supported video format
    pub fn is_video(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.video_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a path names a photo or video
    pub fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.is_image(ext) || self.is_video(ext))
    }
}

/// Configuration for takeout-tidy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads for metadata extraction and hashing (0 = 2x CPUs)
    pub threads: usize,

    /// Persisted date index, reused across runs
    pub index_file: Option<PathBuf>,

    #[serde(flatten)]
    pub media: MediaTypes,

    pub dates: DateConfig,

    pub duplicates: DuplicateConfig,

    pub albums: AlbumConfig,
}

impl Config {
    /// Effective worker count; I/O-bound work gets twice the CPU count
    pub fn worker_threads(&self) -> usize {
        effective_threads(self.threads)
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.dates.validate()?;
        self.duplicates.validate()?;
        self.albums.validate()?;
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# takeout-tidy configuration file (TOML)

# Worker threads for metadata extraction and hashing (0 = twice the CPU count)
threads = 0

# Persisted date index, reused by later runs over the same tree
index_file = "D:/Takeout/.takeout_tidy_dates.json"

image_extensions = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "heif", "avif", "tiff", "tif"]
video_extensions = ["mp4", "mov", "avi", "mkv", "wmv", "flv", "m4v", "3gp", "mts", "m2ts"]
raw_extensions = ["raw", "arw", "cr2", "cr3", "nef", "orf", "rw2", "dng", "raf", "srw", "pef"]

[dates]
# exiftool binary (TAKEOUT_TIDY_EXIFTOOL overrides this)
exiftool_path = "exiftool"
# Paths per exiftool invocation
block_size = 10000
# Dates before this year are treated as corrupted
floor_year = 1900
# Dates later than now + slack are treated as clock skew
future_slack_hours = 24

[duplicates]
albums_folder = "Albums"
catch_all_folder = "No-Albums"
# Regexes on the parent folder name; matching copies are kept only as a last resort
deprioritized_patterns = ['(?i)^photos from \d{4}$', '(?i)^misc(ellaneous)?$']
# holding_dir = "D:/Takeout/Duplicates"
# report_file = "D:/Takeout/Duplicates/duplicates_report.csv"

[albums]
exclude = ["No-Albums"]
# "complete" (day/month/year ranges) or "year"
granularity = "complete"
dry_run = false
"#
        .to_string()
    }
}

/// Worker count for a configured thread setting
pub fn effective_threads(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

/// Errors that can occur when loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write configuration file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize configuration
    SerializeError { source: toml::ser::Error },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
        }
    }
}
