//! Capture-date resolution
//!
//! Every file gets one best-guess capture date, chosen among several metadata
//! sources:
//! - the batch exiftool pass (full tag list), run per block of paths
//! - the embedded EXIF reader (reduced tag list) when the tool is missing or a
//!   block failed
//! - file system timestamps as the last resort
//!
//! Selection is by earliest valid date, not by tag authority: re-encoding tools
//! overwrite derived tags but rarely invent an earlier one.

pub mod exif;
pub mod exiftool;
pub mod parse;

use crate::config::{DateConfig, effective_threads};
use crate::error::{Error, Result};
use crate::index::{DateIndex, normalize_path};
use chrono::{DateTime, Duration, TimeZone, Utc};
use exiftool::RawTags;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{Span, debug, info, info_span, warn};

/// Tag a selected date came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DateSource {
    DateTimeOriginal,
    CreateDate,
    DateCreated,
    CreationDate,
    MediaCreateDate,
    TrackCreateDate,
    EncodedDate,
    MetadataDate,
    ModifyDate,
    /// File modification time as reported by the metadata tool
    FileModifyDate,
    /// File system creation/modification time read directly
    FileSystem,
    /// No valid candidate at all
    Unresolved,
}

impl DateSource {
    /// Tags requested from the metadata tool, most authoritative first
    pub const METADATA_TAGS: [DateSource; 10] = [
        DateSource::DateTimeOriginal,
        DateSource::CreateDate,
        DateSource::DateCreated,
        DateSource::CreationDate,
        DateSource::MediaCreateDate,
        DateSource::TrackCreateDate,
        DateSource::EncodedDate,
        DateSource::MetadataDate,
        DateSource::ModifyDate,
        DateSource::FileModifyDate,
    ];

    pub fn tag_name(&self) -> &'static str {
        match self {
            DateSource::DateTimeOriginal => "DateTimeOriginal",
            DateSource::CreateDate => "CreateDate",
            DateSource::DateCreated => "DateCreated",
            DateSource::CreationDate => "CreationDate",
            DateSource::MediaCreateDate => "MediaCreateDate",
            DateSource::TrackCreateDate => "TrackCreateDate",
            DateSource::EncodedDate => "EncodedDate",
            DateSource::MetadataDate => "MetadataDate",
            DateSource::ModifyDate => "ModifyDate",
            DateSource::FileModifyDate => "FileModifyDate",
            DateSource::FileSystem => "FileSystem",
            DateSource::Unresolved => "Unresolved",
        }
    }

    /// Only considered when no real metadata candidate is valid
    pub fn is_fallback_only(&self) -> bool {
        matches!(self, DateSource::FileModifyDate | DateSource::FileSystem)
    }
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

impl FromStr for DateSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DateSource::METADATA_TAGS
            .into_iter()
            .chain([DateSource::FileSystem, DateSource::Unresolved])
            .find(|tag| tag.tag_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::TimestampParse {
                source_info: s.to_string(),
                message: "unknown date source tag".into(),
            })
    }
}

/// One parsed tag value considered for a file
#[derive(Debug, Clone, PartialEq)]
pub struct DateCandidate {
    pub tag: DateSource,
    pub raw: String,
    pub parsed: Option<DateTime<Utc>>,
    /// Parsed and inside the validity window
    pub valid: bool,
}

/// Immutable per-file result produced by a worker
#[derive(Debug, Clone)]
pub struct ResolvedDate {
    pub path: PathBuf,
    pub date: Option<DateTime<Utc>>,
    pub source: DateSource,
    pub candidates: Vec<DateCandidate>,
}

/// Accepted time range for candidates
#[derive(Debug, Clone, Copy)]
pub struct ValidityWindow {
    pub floor: DateTime<Utc>,
    pub ceiling: DateTime<Utc>,
}

impl ValidityWindow {
    pub fn from_config(config: &DateConfig) -> Self {
        let reference = config.reference_time.unwrap_or_else(Utc::now);
        let floor = Utc
            .with_ymd_and_hms(config.floor_year, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            floor,
            ceiling: reference + Duration::hours(config.future_slack_hours),
        }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        *dt >= self.floor && *dt <= self.ceiling
    }
}

/// Parse and validate raw tag values; parse failures are kept as invalid
pub fn evaluate_candidates(raw: RawTags, window: &ValidityWindow) -> Vec<DateCandidate> {
    raw.into_iter()
        .map(|(tag, raw)| {
            let parsed = match parse::parse_datetime(&raw) {
                Ok(dt) => Some(dt),
                Err(e) => {
                    debug!(tag = %tag, error = %e, "Discarding unparsable candidate");
                    None
                }
            };
            let valid = parsed.as_ref().is_some_and(|dt| window.contains(dt));
            DateCandidate {
                tag,
                raw,
                parsed,
                valid,
            }
        })
        .collect()
}

/// Pick the earliest valid candidate, preferring real metadata over
/// file-time fallbacks; ties keep the more authoritative tag
pub fn select_date(candidates: &[DateCandidate]) -> Option<(DateTime<Utc>, DateSource)> {
    let earliest = |fallback: bool| {
        candidates
            .iter()
            .filter(|c| c.valid && c.tag.is_fallback_only() == fallback)
            .filter_map(|c| c.parsed.map(|dt| (dt, c.tag)))
            .min()
    };

    earliest(false).or_else(|| earliest(true))
}

/// Earlier of a file's creation and modification time
pub fn filesystem_time(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let created = metadata.created().ok().map(DateTime::<Utc>::from);

    match (created, modified) {
        (Some(c), Some(m)) => Some(c.min(m)),
        (c, m) => c.or(m),
    }
}

/// Concurrent date resolver
pub struct DateResolver {
    config: DateConfig,
    window: ValidityWindow,
    pool: rayon::ThreadPool,
    tool_available: bool,
    span: Span,
}

impl DateResolver {
    /// Create a resolver; probes the metadata tool once
    pub fn new(config: DateConfig, threads: usize) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_threads(threads))
            .thread_name(|i| format!("date-worker-{}", i))
            .build()?;

        let tool_available = exiftool::is_available(&config.exiftool_path);
        if !tool_available {
            let e = Error::ToolUnavailable {
                tool: config.exiftool_path.display().to_string(),
            };
            warn!(error = %e, "Falling back to the embedded EXIF reader");
        }

        Ok(Self {
            window: ValidityWindow::from_config(&config),
            config,
            pool,
            tool_available,
            span: info_span!("date_resolver"),
        })
    }

    /// Log under a caller-supplied span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn tool_available(&self) -> bool {
        self.tool_available
    }

    pub fn window(&self) -> &ValidityWindow {
        &self.window
    }

    /// Resolve dates for every path into a fresh index
    pub fn resolve(&self, paths: &[PathBuf]) -> DateIndex {
        let mut index = DateIndex::new();
        self.resolve_into(&mut index, paths);
        index
    }

    /// Resolve only the paths the index does not know yet
    ///
    /// Returns how many paths were resolved.
    pub fn refresh(&self, index: &mut DateIndex, paths: &[PathBuf]) -> usize {
        let missing: Vec<PathBuf> = paths
            .iter()
            .filter(|p| !index.contains(p))
            .cloned()
            .collect();

        debug!(
            cached = paths.len() - missing.len(),
            missing = missing.len(),
            "Refreshing date index"
        );
        self.resolve_into(index, &missing);
        missing.len()
    }

    fn resolve_into(&self, index: &mut DateIndex, paths: &[PathBuf]) {
        let _span = self.span.enter();
        if paths.is_empty() {
            return;
        }

        let blocks: Vec<&[PathBuf]> = paths.chunks(self.config.block_size).collect();
        info!(
            files = paths.len(),
            blocks = blocks.len(),
            tool = self.tool_available,
            "Resolving capture dates"
        );

        // collect() is the barrier: nothing touches the index until every block is done
        let results: Vec<ResolvedDate> = self.pool.install(|| {
            blocks
                .par_iter()
                .flat_map_iter(|block| self.resolve_block(block))
                .collect()
        });

        let mut unresolved = 0usize;
        for resolved in results {
            if resolved.date.is_none() {
                unresolved += 1;
            }
            index.insert(resolved);
        }

        info!(
            resolved = paths.len() - unresolved,
            unresolved, "Capture dates resolved"
        );
    }

    fn resolve_block(&self, block: &[PathBuf]) -> Vec<ResolvedDate> {
        let tool_output: Option<HashMap<PathBuf, RawTags>> = if self.tool_available {
            match exiftool::run_block(&self.config.exiftool_path, block) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!(error = %e, files = block.len(), "Metadata block failed, using embedded reader");
                    None
                }
            }
        } else {
            None
        };

        block
            .par_iter()
            .map(|path| {
                let raw = match tool_output
                    .as_ref()
                    .and_then(|m| m.get(&normalize_path(path)))
                {
                    Some(tags) => tags.clone(),
                    None => exif::read_candidates(path).unwrap_or_else(|e| {
                        debug!(?path, error = %e, "No embedded EXIF dates");
                        Vec::new()
                    }),
                };
                self.resolve_file(path, raw)
            })
            .collect()
    }

    /// Evaluate one file's raw tags plus its file system time
    pub fn resolve_file(&self, path: &Path, raw: RawTags) -> ResolvedDate {
        let mut candidates = evaluate_candidates(raw, &self.window);

        if let Some(fs_time) = filesystem_time(path) {
            candidates.push(DateCandidate {
                tag: DateSource::FileSystem,
                raw: fs_time.to_rfc3339(),
                parsed: Some(fs_time),
                valid: self.window.contains(&fs_time),
            });
        }

        let (date, source) = match select_date(&candidates) {
            Some((dt, tag)) => (Some(dt), tag),
            None => {
                warn!(?path, "No valid capture date candidate");
                (None, DateSource::Unresolved)
            }
        };

        ResolvedDate {
            path: path.to_path_buf(),
            date,
            source,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    fn test_config() -> DateConfig {
        DateConfig {
            exiftool_path: PathBuf::from("/nonexistent/exiftool-for-tests"),
            block_size: 2,
            floor_year: 1900,
            future_slack_hours: 24,
            reference_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
        }
    }

    fn window() -> ValidityWindow {
        ValidityWindow::from_config(&test_config())
    }

    #[test]
    fn test_earliest_valid_candidate_wins() {
        let raw = vec![
            (DateSource::DateTimeOriginal, "2019:03:02 10:00:00".to_string()),
            (DateSource::CreateDate, "2021:05:01 10:00:00".to_string()),
            (DateSource::FileModifyDate, "2023:01:01 10:00:00".to_string()),
        ];
        let candidates = evaluate_candidates(raw, &window());
        let (date, source) = select_date(&candidates).unwrap();

        assert_eq!((date.year(), date.month(), date.day()), (2019, 3, 2));
        assert_eq!(source, DateSource::DateTimeOriginal);
    }

    #[test]
    fn test_selection_is_by_date_not_authority() {
        let raw = vec![
            (DateSource::DateTimeOriginal, "2021:05:01 10:00:00".to_string()),
            (DateSource::ModifyDate, "2018:01:01 00:00:00".to_string()),
        ];
        let (date, source) = select_date(&evaluate_candidates(raw, &window())).unwrap();
        assert_eq!(date.year(), 2018);
        assert_eq!(source, DateSource::ModifyDate);
    }

    #[test]
    fn test_window_rejects_zero_and_future_dates() {
        let raw = vec![
            (DateSource::DateTimeOriginal, "0000:00:00 00:00:00".to_string()),
            (DateSource::CreateDate, "1850:01:01 00:00:00".to_string()),
            (DateSource::MediaCreateDate, "2030:01:01 00:00:00".to_string()),
            (DateSource::ModifyDate, "2022:07:04 12:00:00".to_string()),
        ];
        let candidates = evaluate_candidates(raw, &window());

        assert!(candidates[0].parsed.is_none());
        assert!(!candidates[1].valid);
        assert!(!candidates[2].valid);
        assert!(candidates[3].valid);

        let (date, source) = select_date(&candidates).unwrap();
        assert_eq!(date.year(), 2022);
        assert_eq!(source, DateSource::ModifyDate);
    }

    #[test]
    fn test_slack_allows_slight_clock_skew() {
        let raw = vec![(DateSource::CreateDate, "2024:06:01 12:00:00".to_string())];
        assert!(evaluate_candidates(raw, &window())[0].valid);

        let raw = vec![(DateSource::CreateDate, "2024:06:02 12:00:00".to_string())];
        assert!(!evaluate_candidates(raw, &window())[0].valid);
    }

    #[test]
    fn test_fallback_only_when_no_metadata() {
        let raw = vec![
            (DateSource::CreateDate, "garbage".to_string()),
            (DateSource::FileModifyDate, "2015:01:01 00:00:00".to_string()),
        ];
        let (date, source) = select_date(&evaluate_candidates(raw, &window())).unwrap();
        assert_eq!(date.year(), 2015);
        assert_eq!(source, DateSource::FileModifyDate);

        // A later metadata date still beats an earlier fallback date
        let raw = vec![
            (DateSource::CreateDate, "2020:01:01 00:00:00".to_string()),
            (DateSource::FileModifyDate, "2015:01:01 00:00:00".to_string()),
        ];
        let (date, source) = select_date(&evaluate_candidates(raw, &window())).unwrap();
        assert_eq!(date.year(), 2020);
        assert_eq!(source, DateSource::CreateDate);

        assert!(select_date(&[]).is_none());
    }

    #[test]
    fn test_date_source_roundtrip() {
        for tag in DateSource::METADATA_TAGS {
            assert_eq!(tag.tag_name().parse::<DateSource>().unwrap(), tag);
        }
        assert_eq!("filesystem".parse::<DateSource>().unwrap(), DateSource::FileSystem);
        assert!("Bogus".parse::<DateSource>().is_err());
        assert!(DateSource::FileModifyDate.is_fallback_only());
        assert!(!DateSource::DateTimeOriginal.is_fallback_only());
    }

    #[test]
    fn test_resolver_falls_back_to_filesystem_time() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for (name, year) in [("a.jpg", 2011), ("b.jpg", 2012), ("c.mp4", 2013)] {
            let path = dir.path().join(name);
            fs::write(&path, name.as_bytes()).unwrap();
            let mtime = Utc.with_ymd_and_hms(year, 2, 3, 4, 5, 6).unwrap();
            set_file_mtime(&path, FileTime::from_unix_time(mtime.timestamp(), 0)).unwrap();
            paths.push(path);
        }

        let resolver = DateResolver::new(test_config(), 2).unwrap();
        assert!(!resolver.tool_available());

        let index = resolver.resolve(&paths);
        assert_eq!(index.len(), 3);

        // Creation time (if the file system has one) is "now", so the pinned mtime is the earlier
        let record = index.get(&paths[0]).unwrap();
        assert_eq!(record.source, DateSource::FileSystem);
        assert_eq!(record.date.unwrap().year(), 2011);
        assert_eq!(index.date_of(&paths[2]).unwrap().year(), 2013);
    }

    #[test]
    fn test_refresh_only_resolves_missing() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let resolver = DateResolver::new(test_config(), 1).unwrap();
        let mut index = resolver.resolve(std::slice::from_ref(&a));
        assert_eq!(index.len(), 1);

        let resolved = resolver.refresh(&mut index, &[a.clone(), b.clone()]);
        assert_eq!(resolved, 1);
        assert_eq!(index.len(), 2);
        assert!(index.contains(&b));
    }

    #[test]
    fn test_missing_file_is_unresolved() {
        let resolver = DateResolver::new(test_config(), 1).unwrap();
        let path = PathBuf::from("/definitely/not/here.jpg");
        let index = resolver.resolve(std::slice::from_ref(&path));

        let record = index.get(&path).unwrap();
        assert!(record.date.is_none());
        assert_eq!(record.source, DateSource::Unresolved);
    }
}
