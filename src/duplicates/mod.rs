//! Duplicate detection and resolution across priority-ordered roots
//!
//! Detection narrows candidates in three passes (size, head hash, full
//! signature), all hashing done on a dedicated worker pool. Picking the
//! principal and every file system mutation happen on the calling thread.

pub mod report;
pub mod revise;

use crate::config::{DuplicateConfig, MediaTypes, effective_threads};
use crate::error::{Error, Result};
use crate::fsops;
use crate::hash::{ContentSignature, compute_prefix_hash, compute_signature};
use crate::index::{DateIndex, normalize_path};
use crate::time::DateSource;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Span, debug, error, info, info_span, warn};

pub use report::{ReportRow, read_report, write_report};
pub use revise::{RevisionAction, RevisionStats};

/// What to do with the non-principal members of each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateAction {
    /// Report only
    List,
    /// Relocate duplicates into the holding area
    Move,
    /// Delete duplicates permanently
    Remove,
}

impl DuplicateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateAction::List => "list",
            DuplicateAction::Move => "move",
            DuplicateAction::Remove => "remove",
        }
    }
}

impl fmt::Display for DuplicateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of subtree a file lives in, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FolderClass {
    Album,
    Other,
    CatchAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Principal,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Applied,
    Reverted,
    Failed,
}

/// One scanned media file
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    /// Computed on demand, only for size collisions
    pub signature: Option<ContentSignature>,
    pub date: Option<DateTime<Utc>>,
    pub date_source: DateSource,
    pub class: FolderClass,
    pub deprioritized: bool,
    /// Position of the owning root in the caller's priority list
    pub root_rank: usize,
}

impl FileRecord {
    /// Content signature, computing it on first use
    pub fn ensure_signature(&mut self) -> Result<&ContentSignature> {
        let signature = match self.signature.take() {
            Some(signature) => signature,
            None => compute_signature(&self.path)?,
        };
        Ok(self.signature.insert(signature))
    }
}

/// Principal ordering: the smallest record is kept
pub fn principal_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    a.class
        .cmp(&b.class)
        .then_with(|| a.deprioritized.cmp(&b.deprioritized))
        .then_with(|| match (a.date, b.date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.root_rank.cmp(&b.root_rank))
        .then_with(|| a.path.cmp(&b.path))
}

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub record: FileRecord,
    pub role: Role,
    /// Where the file is now; empty after deletion
    pub current_path: PathBuf,
    pub action: String,
    pub status: ItemStatus,
    pub notes: String,
}

/// Files sharing one content signature; the first member is the principal
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub id: String,
    pub signature: ContentSignature,
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    fn from_records(signature: ContentSignature, mut records: Vec<FileRecord>) -> Self {
        records.sort_by(principal_order);
        let members = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| GroupMember {
                role: if i == 0 { Role::Principal } else { Role::Duplicate },
                current_path: record.path.clone(),
                record,
                action: String::new(),
                status: ItemStatus::Pending,
                notes: String::new(),
            })
            .collect();

        Self {
            id: signature.short().to_string(),
            signature,
            members,
        }
    }

    pub fn principal(&self) -> &GroupMember {
        &self.members[0]
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().skip(1)
    }
}

/// Aggregate counters of one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateStats {
    pub scanned: usize,
    pub groups: usize,
    pub duplicates: usize,
    pub moved: usize,
    pub removed: usize,
    pub pruned_dirs: usize,
    pub failed: usize,
}

impl DuplicateStats {
    pub fn summary(&self) -> String {
        format!(
            "Scanned: {}, Groups: {}, Duplicates: {}, Moved: {}, Removed: {}, Pruned folders: {}, Failed: {}",
            self.scanned,
            self.groups,
            self.duplicates,
            self.moved,
            self.removed,
            self.pruned_dirs,
            self.failed
        )
    }
}

/// Result of one resolution pass
#[derive(Debug, Clone)]
pub struct DuplicateReport {
    pub action: DuplicateAction,
    pub groups: Vec<DuplicateGroup>,
    pub stats: DuplicateStats,
    pub report_path: PathBuf,
}

/// Duplicate resolver over one or more priority-ordered roots
pub struct DuplicateResolver {
    config: DuplicateConfig,
    media: MediaTypes,
    patterns: Vec<Regex>,
    pool: rayon::ThreadPool,
    span: Span,
}

impl DuplicateResolver {
    pub fn new(config: DuplicateConfig, media: MediaTypes, threads: usize) -> Result<Self> {
        config.validate()?;
        let patterns = config.compiled_patterns()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_threads(threads))
            .thread_name(|i| format!("hash-worker-{}", i))
            .build()?;

        Ok(Self {
            config,
            media,
            patterns,
            pool,
            span: info_span!("duplicate_resolver"),
        })
    }

    /// Log under a caller-supplied span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Side area that receives moved duplicates
    pub fn holding_dir(&self, roots: &[PathBuf]) -> PathBuf {
        if let Some(dir) = &self.config.holding_dir {
            return normalize_path(dir);
        }
        let base = roots
            .first()
            .map(|root| normalize_path(root))
            .and_then(|root| root.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        base.join("Duplicates")
    }

    /// Location of the CSV report
    pub fn report_path(&self, roots: &[PathBuf]) -> PathBuf {
        match &self.config.report_file {
            Some(path) => normalize_path(path),
            None => self.holding_dir(roots).join("duplicates_report.csv"),
        }
    }

    /// Classify a file by the folder names between (and including) its root
    fn classify(&self, root: &Path, path: &Path) -> FolderClass {
        let relative_dirs = path
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(|rel| rel.components().map(|c| c.as_os_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        let names: Vec<String> = root
            .file_name()
            .into_iter()
            .chain(relative_dirs)
            .map(|name| name.to_string_lossy().to_lowercase())
            .collect();

        let albums = self.config.albums_folder.to_lowercase();
        let catch_all = self.config.catch_all_folder.to_lowercase();

        if names.iter().any(|n| *n == albums) {
            FolderClass::Album
        } else if names.iter().any(|n| *n == catch_all) {
            FolderClass::CatchAll
        } else {
            FolderClass::Other
        }
    }

    /// Whether the immediate parent folder matches a deprioritized pattern
    fn is_deprioritized(&self, path: &Path) -> bool {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.patterns.iter().any(|re| re.is_match(name)))
    }

    /// Walk the roots and build one record per non-empty media file
    fn scan(&self, roots: &[PathBuf], index: &DateIndex) -> Result<Vec<FileRecord>> {
        let holding = self.holding_dir(roots);
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (rank, root) in roots.iter().enumerate() {
            let root = normalize_path(root);
            if !root.is_dir() {
                return Err(Error::Config(format!(
                    "Root folder does not exist: {}",
                    root.display()
                )));
            }

            let files = fsops::collect_media_files(
                std::slice::from_ref(&root),
                &self.media,
                std::slice::from_ref(&holding),
            );

            for path in files {
                // A file reachable from two roots belongs to the higher-priority one
                if !seen.insert(path.clone()) {
                    continue;
                }
                let size = match fs::metadata(&path) {
                    Ok(metadata) => metadata.len(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot stat file, skipping");
                        continue;
                    }
                };
                if size == 0 {
                    continue;
                }

                records.push(FileRecord {
                    size,
                    signature: None,
                    date: index.date_of(&path),
                    date_source: index.source_of(&path),
                    class: self.classify(&root, &path),
                    deprioritized: self.is_deprioritized(&path),
                    root_rank: rank,
                    path,
                });
            }
        }

        Ok(records)
    }

    /// Detect duplicate groups without touching the file system
    pub fn find_groups(&self, roots: &[PathBuf], index: &DateIndex) -> Result<Vec<DuplicateGroup>> {
        let _span = self.span.enter();
        self.detect(roots, index).map(|(groups, _)| groups)
    }

    /// Groups plus the number of files scanned
    fn detect(&self, roots: &[PathBuf], index: &DateIndex) -> Result<(Vec<DuplicateGroup>, usize)> {
        let records = self.scan(roots, index)?;
        let scanned = records.len();

        let mut by_size: HashMap<u64, Vec<FileRecord>> = HashMap::new();
        for record in records {
            by_size.entry(record.size).or_default().push(record);
        }
        let candidates: Vec<FileRecord> = by_size
            .into_values()
            .filter(|bucket| bucket.len() > 1)
            .flatten()
            .collect();
        debug!(scanned, candidates = candidates.len(), "Size pre-filter done");

        let prefix_bytes = self.config.prefix_bytes;
        let prefixed: Vec<(u64, FileRecord)> = self.pool.install(|| {
            candidates
                .into_par_iter()
                .filter_map(|record| match compute_prefix_hash(&record.path, prefix_bytes) {
                    Ok(hash) => Some((hash, record)),
                    Err(e) => {
                        warn!(path = %record.path.display(), error = %e, "Head hash failed, skipping");
                        None
                    }
                })
                .collect()
        });

        let mut by_prefix: HashMap<(u64, u64), Vec<FileRecord>> = HashMap::new();
        for (hash, record) in prefixed {
            by_prefix.entry((record.size, hash)).or_default().push(record);
        }
        let mut candidates: Vec<FileRecord> = by_prefix
            .into_values()
            .filter(|bucket| bucket.len() > 1)
            .flatten()
            .collect();
        debug!(candidates = candidates.len(), "Head hash pre-filter done");

        self.pool.install(|| {
            candidates.par_iter_mut().for_each(|record| {
                if let Err(e) = record.ensure_signature().map(|_| ()) {
                    warn!(path = %record.path.display(), error = %e, "Signature failed, skipping");
                }
            })
        });

        let mut by_signature: BTreeMap<ContentSignature, Vec<FileRecord>> = BTreeMap::new();
        for record in candidates {
            if let Some(signature) = record.signature.clone() {
                by_signature.entry(signature).or_default().push(record);
            }
        }

        let mut groups: Vec<DuplicateGroup> = by_signature
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(signature, members)| DuplicateGroup::from_records(signature, members))
            .collect();
        groups.sort_by(|a, b| a.principal().record.path.cmp(&b.principal().record.path));

        info!(scanned, groups = groups.len(), "Duplicate detection done");
        Ok((groups, scanned))
    }

    /// Detect duplicates, apply `action`, prune emptied folders and write the report
    pub fn run(
        &self,
        roots: &[PathBuf],
        action: DuplicateAction,
        index: &mut DateIndex,
    ) -> Result<DuplicateReport> {
        let _span = self.span.enter();
        let (mut groups, scanned) = self.detect(roots, index)?;

        let mut stats = DuplicateStats {
            scanned,
            groups: groups.len(),
            duplicates: groups.iter().map(|g| g.members.len() - 1).sum(),
            ..Default::default()
        };

        let roots: Vec<PathBuf> = roots.iter().map(|r| normalize_path(r)).collect();
        let holding = self.holding_dir(&roots);
        info!(%action, groups = stats.groups, duplicates = stats.duplicates, "Applying duplicate action");

        for group in &mut groups {
            for member in &mut group.members {
                if member.role == Role::Principal {
                    member.action = "keep".into();
                    member.status = match action {
                        DuplicateAction::List => ItemStatus::Pending,
                        _ => ItemStatus::Applied,
                    };
                    continue;
                }

                member.action = action.as_str().into();
                let outcome = match action {
                    DuplicateAction::List => continue,
                    DuplicateAction::Move => {
                        let target = held_path(&holding, &roots, &member.record);
                        fsops::move_file(&member.record.path, &target).map(|()| {
                            index.relocate(&member.record.path, &target);
                            stats.moved += 1;
                            Some(target)
                        })
                    }
                    DuplicateAction::Remove => fs::remove_file(&member.record.path)
                        .map_err(Error::from)
                        .map(|()| {
                            index.remove(&member.record.path);
                            stats.removed += 1;
                            None
                        }),
                };

                match outcome {
                    Ok(current) => {
                        debug!(path = %member.record.path.display(), %action, "Duplicate resolved");
                        member.current_path = current.unwrap_or_default();
                        member.status = ItemStatus::Applied;
                    }
                    Err(e) => {
                        error!(path = %member.record.path.display(), error = %e, "Failed to resolve duplicate");
                        member.status = ItemStatus::Failed;
                        member.notes = e.to_string();
                        stats.failed += 1;
                    }
                }
            }
        }

        if action != DuplicateAction::List {
            stats.pruned_dirs = roots.iter().map(|root| fsops::prune_empty_dirs(root)).sum();
        }

        let report_path = self.report_path(&roots);
        write_report(&report_path, &report::rows_from_groups(&groups))?;

        info!("{}", stats.summary());
        Ok(DuplicateReport {
            action,
            groups,
            stats,
            report_path,
        })
    }
}

/// Holding-area location that mirrors a file's path below its root
///
/// Roots sharing a base name get their rank appended so their subtrees stay apart.
fn held_path(holding: &Path, roots: &[PathBuf], record: &FileRecord) -> PathBuf {
    let root = &roots[record.root_rank];
    let root_name = match root.file_name() {
        Some(name) => {
            let shared = roots.iter().filter(|r| r.file_name() == Some(name)).count() > 1;
            if shared {
                format!("{}_{}", name.to_string_lossy(), record.root_rank).into()
            } else {
                name.to_os_string()
            }
        }
        None => format!("root{}", record.root_rank).into(),
    };
    let relative = record.path.strip_prefix(root).unwrap_or(&record.path);

    holding.join(root_name).join(relative)
}
