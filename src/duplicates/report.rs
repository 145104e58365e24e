//! Tabular duplicate report
//!
//! One CSV row per group member. The `action` column is the one a user edits
//! before replaying the report with `revise`.

use crate::duplicates::{DuplicateGroup, ItemStatus, Role};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One report line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub group_id: String,
    pub role: Role,
    pub original_path: PathBuf,
    /// Empty once the file no longer exists anywhere
    pub current_path: PathBuf,
    pub size: u64,
    pub selected_date: Option<DateTime<Utc>>,
    pub date_source: String,
    pub action: String,
    pub status: ItemStatus,
    pub notes: String,
}

impl ReportRow {
    pub fn has_current_file(&self) -> bool {
        !self.current_path.as_os_str().is_empty()
    }
}

/// Flatten groups into report rows, principal first in each group
pub fn rows_from_groups(groups: &[DuplicateGroup]) -> Vec<ReportRow> {
    groups
        .iter()
        .flat_map(|group| {
            group.members.iter().map(move |member| ReportRow {
                group_id: group.id.clone(),
                role: member.role,
                original_path: member.record.path.clone(),
                current_path: member.current_path.clone(),
                size: member.record.size,
                selected_date: member.record.date,
                date_source: member.record.date_source.to_string(),
                action: member.action.clone(),
                status: member.status,
                notes: member.notes.clone(),
            })
        })
        .collect()
}

/// Write rows to a CSV file (header included), replacing any previous report
pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut writer = csv::Writer::from_path(&temp_path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;

    info!(path = %path.display(), rows = rows.len(), "Wrote duplicate report");
    Ok(())
}

/// Read a (possibly user-edited) report
pub fn read_report(path: &Path) -> Result<Vec<ReportRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let rows = reader
        .deserialize::<ReportRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn row(role: Role, path: &str, action: &str) -> ReportRow {
        ReportRow {
            group_id: "abc123".into(),
            role,
            original_path: PathBuf::from(path),
            current_path: PathBuf::from(path),
            size: 42,
            selected_date: Some(Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap()),
            date_source: "DateTimeOriginal".into(),
            action: action.into(),
            status: ItemStatus::Pending,
            notes: String::new(),
        }
    }

    #[test]
    fn test_report_roundtrip_keeps_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        let mut dup = row(Role::Duplicate, "/t/No-Albums/a, with comma.jpg", "move");
        dup.current_path = PathBuf::new();
        dup.selected_date = None;
        let rows = vec![row(Role::Principal, "/t/Albums/a.jpg", "keep"), dup];
        write_report(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "group_id,role,original_path,current_path,size,selected_date,date_source,action,status,notes"
        );
        assert!(content.contains("principal"));

        let loaded = read_report(&path).unwrap();
        assert_eq!(loaded, rows);
        assert!(!loaded[1].has_current_file());
    }

    #[test]
    fn test_read_report_accepts_user_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        fs::write(
            &path,
            "group_id,role,original_path,current_path,size,selected_date,date_source,action,status,notes\n\
             g1,principal,/t/a.jpg,/t/a.jpg,3,,Unresolved,keep,applied,\n\
             g1,duplicate,/t/b.jpg,/h/b.jpg,3,2020-01-01T10:00:00Z,CreateDate, restore_duplicate ,applied,\n",
        )
        .unwrap();

        let rows = read_report(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].action, "restore_duplicate");
        assert_eq!(rows[1].status, ItemStatus::Applied);
        assert!(rows[0].selected_date.is_none());
        assert!(rows[1].selected_date.is_some());
    }
}
