//! Replay of a user-revised duplicate report

use crate::duplicates::report::{ReportRow, read_report, write_report};
use crate::duplicates::{DuplicateResolver, ItemStatus, Role};
use crate::error::{Error, Result};
use crate::fsops;
use crate::hash::compute_signature;
use crate::index::{DateIndex, normalize_path};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Action tokens accepted in the report's `action` column during replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionAction {
    /// Delete the held-aside copy for good
    RemoveDuplicate,
    /// Move the held-aside copy back to its original path
    RestoreDuplicate,
    /// Put the held-aside copy where the principal was and delete the principal
    ReplaceDuplicate,
}

impl FromStr for RevisionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remove_duplicate" => Ok(RevisionAction::RemoveDuplicate),
            "restore_duplicate" => Ok(RevisionAction::RestoreDuplicate),
            "replace_duplicate" => Ok(RevisionAction::ReplaceDuplicate),
            _ => Err(Error::UnknownAction {
                token: s.to_string(),
            }),
        }
    }
}

/// Tokens written by the resolver itself; replaying them does nothing
const PASSIVE_TOKENS: &[&str] = &["", "keep", "list", "move", "remove"];

/// Counters of one replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionStats {
    pub removed: usize,
    pub restored: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub unknown: usize,
    pub failed: usize,
    pub pruned_dirs: usize,
}

impl RevisionStats {
    pub fn summary(&self) -> String {
        format!(
            "Removed: {}, Restored: {}, Replaced: {}, Skipped: {}, Unknown: {}, Failed: {}, Pruned folders: {}",
            self.removed,
            self.restored,
            self.replaced,
            self.skipped,
            self.unknown,
            self.failed,
            self.pruned_dirs
        )
    }
}

impl DuplicateResolver {
    /// Apply the revision tokens of an edited report and rewrite it in place
    pub fn revise(&self, report_path: &Path, index: &mut DateIndex) -> Result<RevisionStats> {
        let _span = self.span.enter();

        let mut rows = read_report(report_path)?;
        let mut stats = RevisionStats::default();
        info!(report = %report_path.display(), rows = rows.len(), "Replaying duplicate report");

        for i in 0..rows.len() {
            let token = rows[i].action.trim().to_lowercase();
            if PASSIVE_TOKENS.contains(&token.as_str()) {
                continue;
            }

            let action = match token.parse::<RevisionAction>() {
                Ok(action) => action,
                Err(e) => {
                    warn!(group = %rows[i].group_id, error = %e, "Skipping report row");
                    stats.unknown += 1;
                    continue;
                }
            };

            let row = &rows[i];
            if row.role != Role::Duplicate || !is_held_aside(row) {
                debug!(
                    group = %row.group_id,
                    path = %row.original_path.display(),
                    status = ?row.status,
                    "Nothing held aside to revise"
                );
                stats.skipped += 1;
                continue;
            }

            let outcome = match action {
                RevisionAction::RemoveDuplicate => remove_held(&mut rows[i], index),
                RevisionAction::RestoreDuplicate => restore_held(&mut rows[i], index),
                RevisionAction::ReplaceDuplicate => replace_principal(&mut rows, i, index),
            };

            match outcome {
                Ok(()) => match action {
                    RevisionAction::RemoveDuplicate => stats.removed += 1,
                    RevisionAction::RestoreDuplicate => stats.restored += 1,
                    RevisionAction::ReplaceDuplicate => stats.replaced += 1,
                },
                Err(e) => {
                    error!(
                        group = %rows[i].group_id,
                        path = %rows[i].current_path.display(),
                        error = %e,
                        "Revision failed"
                    );
                    rows[i].status = ItemStatus::Failed;
                    rows[i].notes = e.to_string();
                    stats.failed += 1;
                }
            }
        }

        let holding = match &self.config.holding_dir {
            Some(dir) => Some(normalize_path(dir)),
            None => report_path.parent().map(normalize_path),
        };
        if let Some(holding) = holding {
            stats.pruned_dirs = fsops::prune_empty_dirs(&holding);
        }

        write_report(report_path, &rows)?;
        info!("{}", stats.summary());
        Ok(stats)
    }
}

/// Whether the row points at a copy a `move` parked away from its original path
///
/// Rows after `list`, or whose move failed, still point at the original file.
/// A failed revision keeps its held path and may be replayed again.
fn is_held_aside(row: &ReportRow) -> bool {
    matches!(row.status, ItemStatus::Applied | ItemStatus::Failed)
        && row.has_current_file()
        && normalize_path(&row.current_path) != normalize_path(&row.original_path)
}

fn ensure_held_exists(row: &ReportRow) -> Result<()> {
    if row.current_path.is_file() {
        Ok(())
    } else {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("held copy is missing: {}", row.current_path.display()),
        )))
    }
}

fn remove_held(row: &mut ReportRow, index: &mut DateIndex) -> Result<()> {
    ensure_held_exists(row)?;
    fs::remove_file(&row.current_path)?;
    index.remove(&row.current_path);

    debug!(path = %row.current_path.display(), "Deleted held duplicate");
    row.current_path = PathBuf::new();
    row.status = ItemStatus::Applied;
    row.notes = "held copy deleted".into();
    Ok(())
}

fn restore_held(row: &mut ReportRow, index: &mut DateIndex) -> Result<()> {
    ensure_held_exists(row)?;
    let held = row.current_path.clone();
    let original = row.original_path.clone();
    if normalize_path(&held) == normalize_path(&original) {
        return Err(Error::ReportEntry {
            group_id: row.group_id.clone(),
            message: "duplicate was never held aside".into(),
        });
    }

    if original.exists() {
        // Occupied by the very same bytes counts as restored
        if compute_signature(&original)? != compute_signature(&held)? {
            return Err(Error::FilesystemConflict { path: original });
        }
        fs::remove_file(&held)?;
        index.remove(&held);
        row.notes = "identical file already at original path".into();
    } else {
        fsops::move_file(&held, &original)?;
        index.relocate(&held, &original);
        row.notes = "restored".into();
    }

    debug!(path = %original.display(), "Restored duplicate");
    row.current_path = original;
    row.status = ItemStatus::Reverted;
    Ok(())
}

/// Swap the held copy in at the principal's exact path
///
/// The principal is renamed aside first and only deleted once the held copy
/// sits at its path; a failed move puts the principal back.
fn replace_principal(rows: &mut [ReportRow], i: usize, index: &mut DateIndex) -> Result<()> {
    ensure_held_exists(&rows[i])?;
    let group_id = rows[i].group_id.clone();

    let p = rows
        .iter()
        .position(|r| r.group_id == group_id && r.role == Role::Principal)
        .ok_or_else(|| Error::ReportEntry {
            group_id: group_id.clone(),
            message: "no principal row".into(),
        })?;

    if !rows[p].has_current_file() || !rows[p].current_path.is_file() {
        return Err(Error::ReportEntry {
            group_id,
            message: "principal file no longer exists".into(),
        });
    }

    let principal = rows[p].current_path.clone();
    let held = rows[i].current_path.clone();
    let aside = aside_path(&principal)?;

    fs::rename(&principal, &aside)?;
    if let Err(e) = fsops::move_file(&held, &principal) {
        if let Err(undo) = fs::rename(&aside, &principal) {
            error!(
                principal = %principal.display(),
                aside = %aside.display(),
                error = %undo,
                "Failed to put principal back"
            );
        }
        return Err(e);
    }
    fs::remove_file(&aside)?;

    index.remove(&principal);
    index.relocate(&held, &principal);

    debug!(principal = %principal.display(), held = %held.display(), "Replaced principal");
    let replacement_of = rows[i].original_path.display().to_string();

    let row = &mut rows[i];
    row.current_path = principal;
    row.status = ItemStatus::Reverted;
    row.notes = "replaced principal".into();

    let principal_row = &mut rows[p];
    principal_row.current_path = PathBuf::new();
    principal_row.status = ItemStatus::Applied;
    principal_row.notes = format!("replaced by {}", replacement_of);
    Ok(())
}

/// Free sibling name the principal is parked under during a replace
fn aside_path(principal: &Path) -> Result<PathBuf> {
    let mut name = principal
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".replacing");
    fsops::unique_path(&principal.with_file_name(name))
}
