//! File system primitives shared by the duplicate resolver and album normalizer
//!
//! All of these run on the calling thread only. Moves and renames into a
//! shared destination would race if parallelized.

use crate::config::MediaTypes;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Collect media files under the given roots, skipping excluded subtrees
///
/// Output is sorted so later stages see a deterministic order.
pub fn collect_media_files(roots: &[PathBuf], media: &MediaTypes, exclude: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        if !root.exists() {
            warn!(?root, "Input directory does not exist, skipping");
            continue;
        }

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !exclude.iter().any(|x| e.path().starts_with(x)))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if entry.file_type().is_file() && media.is_media(path) {
                files.push(path.to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    debug!(count = files.len(), "Collected media files");
    files
}

/// Move a file, creating the destination's parent folders
///
/// Refuses to overwrite an existing destination.
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(Error::FilesystemConflict {
            path: dest.to_path_buf(),
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    // Try rename first (fast on the same filesystem)
    if fs::rename(source, dest).is_err() {
        // Fall back to copy + delete for cross-filesystem moves
        copy_file(source, dest)?;
        if let Ok(metadata) = fs::metadata(source)
            && let Ok(mtime) = metadata.modified()
        {
            let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
        }
        fs::remove_file(source)?;
    }

    Ok(())
}

/// Copy file with buffered I/O
fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    let src_file = File::open(source)?;
    let dest_file = File::create(dest)?;

    let mut reader = BufReader::with_capacity(256 * 1024, src_file);
    let mut writer = BufWriter::with_capacity(256 * 1024, dest_file);

    let mut buffer = vec![0u8; 256 * 1024];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }

    writer.flush()?;
    Ok(())
}

/// First free variant of `path`: `name.ext`, `name_1.ext`, `name_2.ext`, ...
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config(format!("Invalid filename: {}", path.display())))?
        .to_string();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let parent = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();

    for i in 1..10000 {
        let candidate = parent.join(format!("{}_{}{}", stem, i, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(Error::FilesystemConflict {
        path: path.to_path_buf(),
    })
}

/// Delete empty folders below `root` (never `root` itself), deepest first
///
/// Returns the number of folders removed.
pub fn prune_empty_dirs(root: &Path) -> usize {
    // Worklist traversal; the stack keeps depth so removal can go bottom-up
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];
    let mut dirs: Vec<(PathBuf, usize)> = Vec::new();

    while let Some((dir, depth)) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                stack.push((entry.path(), depth + 1));
                dirs.push((entry.path(), depth + 1));
            }
        }
    }

    dirs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut removed = 0;
    for (dir, _) in dirs {
        if is_empty_dir(&dir) {
            match fs::remove_dir(&dir) {
                Ok(()) => {
                    debug!(?dir, "Removed empty folder");
                    removed += 1;
                }
                Err(e) => warn!(?dir, error = %e, "Failed to remove empty folder"),
            }
        }
    }

    removed
}

/// Whether a folder holds nothing at all
pub fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file_creates_parents_and_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.jpg");
        let dest = dir.path().join("x").join("y").join("a.jpg");
        fs::write(&src, b"data").unwrap();

        move_file(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"data");

        let other = dir.path().join("b.jpg");
        fs::write(&other, b"other").unwrap();
        assert!(matches!(
            move_file(&other, &dest),
            Err(Error::FilesystemConflict { .. })
        ));
        assert!(other.exists());
    }

    #[test]
    fn test_unique_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        assert_eq!(unique_path(&path).unwrap(), path);

        fs::write(&path, b"1").unwrap();
        assert_eq!(unique_path(&path).unwrap(), dir.path().join("photo_1.jpg"));

        fs::write(dir.path().join("photo_1.jpg"), b"2").unwrap();
        assert_eq!(unique_path(&path).unwrap(), dir.path().join("photo_2.jpg"));
    }

    #[test]
    fn test_prune_empty_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("keep/sub")).unwrap();
        fs::write(dir.path().join("keep/sub/file.jpg"), b"x").unwrap();
        fs::create_dir_all(dir.path().join("keep/empty")).unwrap();

        let removed = prune_empty_dirs(dir.path());
        assert_eq!(removed, 4);
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("keep/empty").exists());
        assert!(dir.path().join("keep/sub/file.jpg").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_collect_media_files_skips_excluded() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Albums/Trip")).unwrap();
        fs::create_dir_all(dir.path().join("Duplicates")).unwrap();
        fs::write(dir.path().join("Albums/Trip/b.jpg"), b"b").unwrap();
        fs::write(dir.path().join("Albums/Trip/a.MP4"), b"a").unwrap();
        fs::write(dir.path().join("Albums/Trip/a.MP4.json"), b"{}").unwrap();
        fs::write(dir.path().join("Duplicates/c.jpg"), b"c").unwrap();

        let files = collect_media_files(
            &[dir.path().to_path_buf()],
            &MediaTypes::default(),
            &[dir.path().join("Duplicates")],
        );
        assert_eq!(
            files,
            vec![
                dir.path().join("Albums/Trip/a.MP4"),
                dir.path().join("Albums/Trip/b.jpg"),
            ]
        );
    }
}
