//! Embedded EXIF reader, used when the batch tool is unavailable or failed

use crate::error::{Error, Result};
use crate::time::DateSource;
use crate::time::exiftool::RawTags;
use exif::{Field, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// Reduced tag set: (date tag, matching offset tag, candidate tag)
const DATE_TAGS: &[(Tag, Tag, DateSource)] = &[
    (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal, DateSource::DateTimeOriginal),
    (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized, DateSource::CreateDate),
    (Tag::DateTime, Tag::OffsetTime, DateSource::ModifyDate),
];

/// Read raw date candidates from a file's embedded EXIF block
pub fn read_candidates(path: &Path) -> Result<RawTags> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut candidates = Vec::new();
    for (date_tag, offset_tag, source) in DATE_TAGS {
        let Some(raw) = exif.get_field(*date_tag, In::PRIMARY).and_then(ascii_value) else {
            continue;
        };

        let raw = match exif.get_field(*offset_tag, In::PRIMARY).and_then(ascii_value) {
            Some(offset) => format!("{}{}", raw, offset),
            None => raw,
        };

        trace!(?path, tag = %source, %raw, "Found EXIF date");
        candidates.push((*source, raw));
    }

    Ok(candidates)
}

/// First ASCII component of a field, trimmed
fn ascii_value(field: &Field) -> Option<String> {
    match field.value {
        Value::Ascii(ref parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}
