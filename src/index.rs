//! Path-keyed date index
//!
//! Built once per run by the date resolver's reducer, optionally persisted as a
//! JSON array of records so later runs over an unchanged tree can skip the
//! metadata pass. Keys are normalized absolute paths; a moved file's record is
//! re-keyed in place, never duplicated.

use crate::error::{Error, Result};
use crate::time::{DateSource, ResolvedDate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// One persisted index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRecord {
    /// Path the date was resolved for
    pub source_path: PathBuf,

    /// Where the file lives now, if it was ever moved or renamed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocated_path: Option<PathBuf>,

    /// Selected capture date (ISO-8601), `None` when nothing valid was found
    pub date: Option<DateTime<Utc>>,

    /// Tag the date came from
    pub source: DateSource,
}

impl DateRecord {
    /// Path the file is currently expected at
    pub fn current_path(&self) -> &Path {
        self.relocated_path.as_deref().unwrap_or(&self.source_path)
    }
}

impl From<ResolvedDate> for DateRecord {
    fn from(resolved: ResolvedDate) -> Self {
        Self {
            source_path: normalize_path(&resolved.path),
            relocated_path: None,
            date: resolved.date,
            source: resolved.source,
        }
    }
}

/// Path-keyed map of resolved dates
#[derive(Debug, Clone, Default)]
pub struct DateIndex {
    records: HashMap<PathBuf, DateRecord>,
}

impl DateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the record for a resolved file
    pub fn insert(&mut self, resolved: ResolvedDate) {
        let record = DateRecord::from(resolved);
        self.records
            .insert(record.current_path().to_path_buf(), record);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(&normalize_path(path))
    }

    pub fn get(&self, path: &Path) -> Option<&DateRecord> {
        self.records.get(&normalize_path(path))
    }

    /// Selected date for a path, if one was resolved
    pub fn date_of(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.get(path).and_then(|r| r.date)
    }

    /// Source tag for a path (`Unresolved` when unknown)
    pub fn source_of(&self, path: &Path) -> DateSource {
        self.get(path)
            .map(|r| r.source)
            .unwrap_or(DateSource::Unresolved)
    }

    /// Drop the record of a deleted file
    pub fn remove(&mut self, path: &Path) -> Option<DateRecord> {
        self.records.remove(&normalize_path(path))
    }

    /// Re-key a record after its file moved from `old` to `new`
    ///
    /// Returns false when `old` is not indexed.
    pub fn relocate(&mut self, old: &Path, new: &Path) -> bool {
        let old_key = normalize_path(old);
        let new_key = normalize_path(new);

        match self.records.remove(&old_key) {
            Some(mut record) => {
                debug!(old = %old_key.display(), new = %new_key.display(), "Relocating index record");
                record.relocated_path = Some(new_key.clone());
                self.records.insert(new_key, record);
                true
            }
            None => false,
        }
    }

    /// Re-key every record under `old_dir` after the folder moved to `new_dir`
    pub fn relocate_prefix(&mut self, old_dir: &Path, new_dir: &Path) -> usize {
        let old_dir = normalize_path(old_dir);
        let new_dir = normalize_path(new_dir);

        let affected: Vec<PathBuf> = self
            .records
            .keys()
            .filter(|key| key.starts_with(&old_dir))
            .cloned()
            .collect();

        for key in &affected {
            if let Ok(relative) = key.strip_prefix(&old_dir) {
                let target = new_dir.join(relative);
                self.relocate(key, &target);
            }
        }

        affected.len()
    }

    /// Whether the file at `path` (current or original location) was ever moved
    pub fn was_relocated(&self, path: &Path) -> bool {
        let key = normalize_path(path);
        if let Some(record) = self.records.get(&key) {
            return record.relocated_path.is_some();
        }
        self.records
            .values()
            .any(|r| r.relocated_path.is_some() && r.source_path == key)
    }

    /// Iterate records in path order
    pub fn records(&self) -> impl Iterator<Item = &DateRecord> {
        let sorted: BTreeMap<&PathBuf, &DateRecord> = self.records.iter().collect();
        sorted.into_values()
    }

    /// Record count per source tag
    pub fn summary(&self) -> BTreeMap<DateSource, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.source).or_insert(0) += 1;
        }
        counts
    }

    /// Load an index document; a missing file yields an empty index
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "Date index does not exist, starting empty");
            return Ok(Self::new());
        }

        let file = File::open(path)
            .map_err(|e| Error::IndexFile(format!("Failed to open date index: {}", e)))?;
        let records: Vec<DateRecord> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::IndexFile(format!("Failed to parse date index: {}", e)))?;

        let mut index = Self::new();
        for record in records {
            index
                .records
                .insert(normalize_path(record.current_path()), record);
        }

        info!(records = index.len(), "Loaded date index");
        Ok(index)
    }

    /// Persist the index as a JSON array
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let file = File::create(&temp_path)
            .map_err(|e| Error::IndexFile(format!("Failed to create temp index file: {}", e)))?;
        let records: Vec<&DateRecord> = self.records().collect();
        serde_json::to_writer_pretty(BufWriter::new(file), &records)
            .map_err(|e| Error::IndexFile(format!("Failed to write date index: {}", e)))?;

        fs::rename(&temp_path, path)
            .map_err(|e| Error::IndexFile(format!("Failed to rename temp index file: {}", e)))?;

        info!(records = self.len(), "Saved date index");
        Ok(())
    }
}

/// Absolute, lexically cleaned form of a path
///
/// Does not touch the filesystem, so it also works for paths that were just
/// deleted or are about to be created.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
