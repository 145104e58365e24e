//! Error types for takeout-tidy

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for takeout-tidy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for takeout-tidy
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata tool '{tool}' is not available")]
    ToolUnavailable { tool: String },

    #[error("Metadata tool failed: {message}")]
    MetadataTool { message: String },

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("Failed to parse timestamp from {source_info}: {message}")]
    TimestampParse { source_info: String, message: String },

    #[error("File hash computation failed for {path}: {message}")]
    HashComputation { path: PathBuf, message: String },

    #[error("Destination already occupied by a different file: {path}")]
    FilesystemConflict { path: PathBuf },

    #[error("Unknown action '{token}'")]
    UnknownAction { token: String },

    #[error("Date index error: {0}")]
    IndexFile(String),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    #[error("Invalid report entry in group {group_id}: {message}")]
    ReportEntry { group_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Chrono parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
