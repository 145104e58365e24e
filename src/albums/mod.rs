//! Album folder normalization
//!
//! Renames every album folder below a parent to `<date-or-range> - <name>`.
//! A rename onto an existing folder becomes a file-by-file merge; nothing is
//! ever overwritten.

pub mod naming;

use crate::config::{AlbumConfig, MediaTypes};
use crate::error::Result;
use crate::fsops;
use crate::index::{DateIndex, normalize_path};
use chrono::{DateTime, Utc};
use naming::{NameParts, compose, range_label, split_name};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Span, debug, error, info, info_span, warn};

/// What happened to one album folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumOutcome {
    Unchanged,
    Excluded,
    Renamed,
    /// Every file went into the existing target; the source folder is gone
    FullyMerged,
    /// Some files could not be moved; the source folder was left in place
    PartiallyMerged,
    /// Dry run: a rename or merge would have happened
    Planned,
    Failed,
}

/// One processed album folder
#[derive(Debug, Clone)]
pub struct AlbumFolder {
    pub path: PathBuf,
    pub original_name: String,
    pub clean_name: String,
    /// Label derived from the folder's own files
    pub range_label: Option<String>,
    pub new_name: String,
    /// Existing folder the album was merged into
    pub merge_target: Option<PathBuf>,
    pub outcome: AlbumOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumStats {
    pub folders: usize,
    pub renamed: usize,
    pub merged: usize,
    pub fully_merged: usize,
    pub partially_merged: usize,
    pub unchanged: usize,
    pub excluded: usize,
    pub planned: usize,
    pub failed: usize,
}

impl AlbumStats {
    pub fn summary(&self) -> String {
        format!(
            "Folders: {}, Renamed: {}, Merged: {} (fully: {}, partially: {}), Unchanged: {}, Excluded: {}, Planned: {}, Failed: {}",
            self.folders,
            self.renamed,
            self.merged,
            self.fully_merged,
            self.partially_merged,
            self.unchanged,
            self.excluded,
            self.planned,
            self.failed
        )
    }

    fn record(&mut self, outcome: AlbumOutcome) {
        self.folders += 1;
        match outcome {
            AlbumOutcome::Unchanged => self.unchanged += 1,
            AlbumOutcome::Excluded => self.excluded += 1,
            AlbumOutcome::Renamed => self.renamed += 1,
            AlbumOutcome::FullyMerged => {
                self.merged += 1;
                self.fully_merged += 1;
            }
            AlbumOutcome::PartiallyMerged => {
                self.merged += 1;
                self.partially_merged += 1;
            }
            AlbumOutcome::Planned => self.planned += 1,
            AlbumOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlbumReport {
    pub folders: Vec<AlbumFolder>,
    pub stats: AlbumStats,
}

/// Result of merging one folder into another
#[derive(Debug, Default)]
struct MergeOutcome {
    moved: usize,
    dropped_duplicates: usize,
    failed: usize,
}

pub struct AlbumNormalizer {
    config: AlbumConfig,
    media: MediaTypes,
    span: Span,
}

impl AlbumNormalizer {
    pub fn new(config: AlbumConfig, media: MediaTypes) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            media,
            span: info_span!("album_normalizer"),
        })
    }

    /// Log under a caller-supplied span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.config
            .exclude
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(name))
    }

    /// Normalize every direct subfolder of `parent`, in name order
    pub fn run(&self, parent: &Path, index: &mut DateIndex) -> Result<AlbumReport> {
        let _span = self.span.enter();
        let parent = normalize_path(parent);

        let mut subfolders: Vec<PathBuf> = fs::read_dir(&parent)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.path())
            .collect();
        subfolders.sort();

        info!(
            parent = %parent.display(),
            folders = subfolders.len(),
            dry_run = self.config.dry_run,
            "Normalizing album folders"
        );

        let mut report = AlbumReport::default();
        for folder in subfolders {
            // An earlier merge may have consumed it
            if !folder.is_dir() {
                continue;
            }
            let album = self.process_folder(&parent, &folder, index);
            report.stats.record(album.outcome);
            report.folders.push(album);
        }

        info!("{}", report.stats.summary());
        Ok(report)
    }

    /// Target name for a folder, given the dates of its direct files
    pub fn target_name(&self, name: &str, dates: &[DateTime<Utc>]) -> (NameParts, Option<String>, String) {
        let parts = split_name(name);
        let label = if parts.clean_starts_with_year() {
            None
        } else {
            range_label(dates, self.config.granularity)
        };

        let new_name = compose(label.as_deref().or(parts.prefix.as_deref()), &parts.clean)
            .unwrap_or_else(|| name.to_string());
        (parts, label, new_name)
    }

    fn process_folder(&self, parent: &Path, folder: &Path, index: &mut DateIndex) -> AlbumFolder {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut album = AlbumFolder {
            path: folder.to_path_buf(),
            original_name: name.clone(),
            clean_name: name.clone(),
            range_label: None,
            new_name: name.clone(),
            merge_target: None,
            outcome: AlbumOutcome::Unchanged,
        };

        if self.is_excluded(&name) {
            debug!(folder = %name, "Excluded from normalization");
            album.outcome = AlbumOutcome::Excluded;
            return album;
        }

        let dates = self.direct_file_dates(folder, index);
        let (parts, label, new_name) = self.target_name(&name, &dates);
        album.clean_name = parts.clean;
        album.range_label = label;
        album.new_name = new_name;

        if album.new_name == name {
            return album;
        }

        let target = parent.join(&album.new_name);
        let merging = target.exists() && !same_dir(folder, &target);
        if merging {
            album.merge_target = Some(target.clone());
        }

        if self.config.dry_run {
            info!(from = %name, to = %album.new_name, merge = merging, "Planned album rename");
            album.outcome = AlbumOutcome::Planned;
            return album;
        }

        album.outcome = if merging {
            let merge = merge_into(folder, &target, index);
            fsops::prune_empty_dirs(folder);
            let emptied = fsops::is_empty_dir(folder) && fs::remove_dir(folder).is_ok();

            info!(
                from = %name,
                to = %album.new_name,
                moved = merge.moved,
                duplicates = merge.dropped_duplicates,
                failed = merge.failed,
                "Merged album folder"
            );
            if emptied {
                AlbumOutcome::FullyMerged
            } else {
                warn!(folder = %folder.display(), "Album only partially merged, left in place");
                AlbumOutcome::PartiallyMerged
            }
        } else {
            match fs::rename(folder, &target) {
                Ok(()) => {
                    index.relocate_prefix(folder, &target);
                    info!(from = %name, to = %album.new_name, "Renamed album folder");
                    AlbumOutcome::Renamed
                }
                Err(e) => {
                    error!(folder = %folder.display(), error = %e, "Failed to rename album folder");
                    AlbumOutcome::Failed
                }
            }
        };

        album
    }

    /// Per-file dates of the media files directly inside `folder`
    ///
    /// Each file contributes the earlier of its indexed date and its mtime.
    fn direct_file_dates(&self, folder: &Path, index: &DateIndex) -> Vec<DateTime<Utc>> {
        let Ok(entries) = fs::read_dir(folder) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| entry.path())
            .filter(|path| self.media.is_media(path))
            .filter_map(|path| {
                let mtime = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from);
                match (index.date_of(&path), mtime) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            })
            .collect()
    }
}

/// Whether two existing paths name the same folder (case-only renames)
fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move the contents of `source` into `target`, folder by folder
///
/// Same-size collisions count as duplicates and the source copy is dropped;
/// any other collision gets a free `_N` name.
fn merge_into(source: &Path, target: &Path, index: &mut DateIndex) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut stack = vec![(source.to_path_buf(), target.to_path_buf())];

    while let Some((from_dir, to_dir)) = stack.pop() {
        let entries = match fs::read_dir(&from_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %from_dir.display(), error = %e, "Cannot read folder during merge");
                outcome.failed += 1;
                continue;
            }
        };

        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let dest = to_dir.join(file_name);

            if path.is_dir() {
                stack.push((path.clone(), dest));
                continue;
            }

            match merge_file(&path, &dest, index) {
                Ok(true) => outcome.moved += 1,
                Ok(false) => outcome.dropped_duplicates += 1,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to merge file");
                    outcome.failed += 1;
                }
            }
        }
    }

    outcome
}

/// Returns false when the file was a same-size duplicate and got deleted
fn merge_file(path: &Path, dest: &Path, index: &mut DateIndex) -> Result<bool> {
    if dest.exists() {
        let same_size = fs::metadata(path)?.len() == fs::metadata(dest)?.len();
        if same_size {
            fs::remove_file(path)?;
            index.remove(path);
            debug!(path = %path.display(), "Dropped same-size duplicate while merging");
            return Ok(false);
        }
    }

    let dest = fsops::unique_path(dest)?;
    fsops::move_file(path, &dest)?;
    index.relocate(path, &dest);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Granularity;
    use crate::time::{DateSource, ResolvedDate};
    use chrono::TimeZone;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    fn normalizer(config: AlbumConfig) -> AlbumNormalizer {
        AlbumNormalizer::new(config, MediaTypes::default()).unwrap()
    }

    fn write_dated(path: &Path, content: &[u8], date: DateTime<Utc>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(date.timestamp(), 0)).unwrap();
    }

    #[test]
    fn test_rename_is_deterministic() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("2021_05_yosemite")).unwrap();

        let normalizer = normalizer(AlbumConfig::default());
        let mut index = DateIndex::new();

        let report = normalizer.run(dir.path(), &mut index).unwrap();
        assert_eq!(report.stats.renamed, 1);
        assert!(dir.path().join("2021.05 - yosemite").is_dir());

        let report = normalizer.run(dir.path(), &mut index).unwrap();
        assert_eq!(report.stats.renamed, 0);
        assert_eq!(report.stats.unchanged, 1);
    }

    #[test]
    fn test_range_from_direct_files_only() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Hiking");
        write_dated(&album.join("a.jpg"), b"a", Utc.with_ymd_and_hms(2019, 7, 4, 10, 0, 0).unwrap());
        write_dated(&album.join("b.jpg"), b"b", Utc.with_ymd_and_hms(2019, 7, 9, 10, 0, 0).unwrap());
        // Nested and non-media files do not count
        write_dated(&album.join("deep/c.jpg"), b"c", Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
        write_dated(&album.join("notes.txt"), b"t", Utc.with_ymd_and_hms(2002, 1, 1, 0, 0, 0).unwrap());

        let mut index = DateIndex::new();
        normalizer(AlbumConfig::default()).run(dir.path(), &mut index).unwrap();
        assert!(dir.path().join("2019.07 - Hiking/deep/c.jpg").exists());

        let year_mode = AlbumConfig {
            granularity: Granularity::Year,
            ..AlbumConfig::default()
        };
        normalizer(year_mode).run(dir.path(), &mut index).unwrap();
        assert!(dir.path().join("2019 - Hiking").is_dir());
    }

    #[test]
    fn test_index_date_wins_when_earlier() {
        let dir = TempDir::new().unwrap();
        let photo = dir.path().join("Party/a.jpg");
        write_dated(&photo, b"a", Utc.with_ymd_and_hms(2023, 3, 3, 0, 0, 0).unwrap());

        let mut index = DateIndex::new();
        index.insert(ResolvedDate {
            path: photo.clone(),
            date: Some(Utc.with_ymd_and_hms(2018, 12, 24, 20, 0, 0).unwrap()),
            source: DateSource::DateTimeOriginal,
            candidates: Vec::new(),
        });

        normalizer(AlbumConfig::default()).run(dir.path(), &mut index).unwrap();
        let renamed = dir.path().join("2018.12.24 - Party/a.jpg");
        assert!(renamed.exists());
        // The index followed the folder rename
        assert!(index.contains(&renamed));
        assert!(index.was_relocated(&photo));
    }

    #[test]
    fn test_collision_merges_without_loss() {
        let dir = TempDir::new().unwrap();
        let date = Utc.with_ymd_and_hms(2020, 8, 1, 9, 0, 0).unwrap();
        write_dated(&dir.path().join("2020.08.01 - Beach/a.jpg"), b"aaaa", date);
        write_dated(&dir.path().join("2020.08.01 - Beach/b.jpg"), b"bbbb", date);
        write_dated(&dir.path().join("Beach/a.jpg"), b"AAAA", date);
        write_dated(&dir.path().join("Beach/b.jpg"), b"different size", date);
        write_dated(&dir.path().join("Beach/c.jpg"), b"cccc", date);

        let mut index = DateIndex::new();
        let report = normalizer(AlbumConfig::default()).run(dir.path(), &mut index).unwrap();
        assert_eq!(report.stats.fully_merged, 1);
        assert_eq!(report.stats.merged, 1);
        assert!(!dir.path().join("Beach").exists());

        let target = dir.path().join("2020.08.01 - Beach");
        // Same-size collision kept the existing copy
        assert_eq!(fs::read(target.join("a.jpg")).unwrap(), b"aaaa");
        assert_eq!(fs::read(target.join("b.jpg")).unwrap(), b"bbbb");
        assert_eq!(fs::read(target.join("b_1.jpg")).unwrap(), b"different size");
        assert_eq!(fs::read(target.join("c.jpg")).unwrap(), b"cccc");
    }

    #[test]
    fn test_blocked_merge_is_partial() {
        let dir = TempDir::new().unwrap();
        let date = Utc.with_ymd_and_hms(2020, 8, 1, 9, 0, 0).unwrap();
        write_dated(&dir.path().join("2020.08.01 - Beach/a.jpg"), b"aaaa", date);
        // A plain file where the source has a sub-folder blocks that sub-folder
        write_dated(&dir.path().join("2020.08.01 - Beach/raw"), b"not a folder", date);
        write_dated(&dir.path().join("Beach/c.jpg"), b"cccc", date);
        write_dated(&dir.path().join("Beach/raw/d.jpg"), b"dddd", date);

        let mut index = DateIndex::new();
        let report = normalizer(AlbumConfig::default()).run(dir.path(), &mut index).unwrap();
        assert_eq!(report.stats.merged, 1);
        assert_eq!(report.stats.partially_merged, 1);
        assert_eq!(report.stats.fully_merged, 0);

        let beach = report
            .folders
            .iter()
            .find(|f| f.original_name == "Beach")
            .unwrap();
        assert_eq!(beach.outcome, AlbumOutcome::PartiallyMerged);

        // What moved, moved; the blocked file stays in the source folder
        let target = dir.path().join("2020.08.01 - Beach");
        assert_eq!(fs::read(target.join("c.jpg")).unwrap(), b"cccc");
        assert_eq!(fs::read(dir.path().join("Beach/raw/d.jpg")).unwrap(), b"dddd");
        assert_eq!(fs::read(target.join("raw")).unwrap(), b"not a folder");
    }

    #[test]
    fn test_excluded_and_dry_run() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("No-Albums")).unwrap();
        fs::create_dir_all(dir.path().join("2021_05_yosemite")).unwrap();

        let config = AlbumConfig {
            dry_run: true,
            ..AlbumConfig::default()
        };
        let report = normalizer(config).run(dir.path(), &mut DateIndex::new()).unwrap();

        assert_eq!(report.stats.excluded, 1);
        assert_eq!(report.stats.planned, 1);
        assert!(dir.path().join("2021_05_yosemite").is_dir());
        let planned = report
            .folders
            .iter()
            .find(|f| f.outcome == AlbumOutcome::Planned)
            .unwrap();
        assert_eq!(planned.new_name, "2021.05 - yosemite");
    }

    #[test]
    fn test_target_name_keeps_own_year() {
        let normalizer = normalizer(AlbumConfig::default());
        let dates = [Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()];

        let (_, label, name) = normalizer.target_name("1000 Islands", &dates);
        assert!(label.is_none());
        assert_eq!(name, "1000 Islands");

        let (parts, label, name) = normalizer.target_name("Trip", &dates);
        assert_eq!(parts.clean, "Trip");
        assert_eq!(label.as_deref(), Some("2020.01.01"));
        assert_eq!(name, "2020.01.01 - Trip");
    }
}
