//! takeout-tidy - Tidy up an exported photo library
//!
//! This library provides the three stages that turn a raw photo export
//! into a clean library:
//! - capture-date resolution from exiftool, embedded EXIF and file times
//! - duplicate detection across priority-ordered roots, with reversible
//!   actions and a replayable report
//! - album folder normalization with date-range prefixes and safe merges

pub mod albums;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fsops;
pub mod hash;
pub mod index;
pub mod time;

pub use albums::{AlbumNormalizer, AlbumOutcome, AlbumReport, AlbumStats};
pub use cli::{Cli, Command};
pub use config::{AlbumConfig, Config, ConfigError, DateConfig, DuplicateConfig, Granularity, MediaTypes};
pub use duplicates::{DuplicateAction, DuplicateReport, DuplicateResolver, DuplicateStats, RevisionStats};
pub use error::{Error, Result};
pub use index::{DateIndex, DateRecord};
pub use time::{DateResolver, DateSource};
