//! Batch exiftool invocation
//!
//! One process per block of paths. Paths go through an argument file and the
//! JSON output is redirected into a scratch file, so neither the command line
//! nor a pipe buffer limits the block size.

use crate::error::{Error, Result};
use crate::index::normalize_path;
use crate::time::DateSource;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Raw tag values per file, in candidate-tag order
pub type RawTags = Vec<(DateSource, String)>;

/// Check whether the tool can be executed at all
pub fn is_available(tool: &Path) -> bool {
    Command::new(tool)
        .arg("-ver")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Run the tool over one block and return the raw time tags per file
///
/// Files the tool produced no entry for are simply absent from the map.
pub fn run_block(tool: &Path, block: &[PathBuf]) -> Result<HashMap<PathBuf, RawTags>> {
    let argfile = NamedTempFile::new()?;
    {
        let mut writer = BufWriter::new(argfile.as_file());
        for path in block {
            writeln!(writer, "{}", normalize_path(path).display())?;
        }
        writer.flush()?;
    }

    let scratch = NamedTempFile::new()?;

    let mut command = Command::new(tool);
    command.args(["-json", "-charset", "filename=utf8", "-api", "largefilesupport=1"]);
    for tag in DateSource::METADATA_TAGS {
        command.arg(format!("-{}", tag.tag_name()));
    }
    command
        .arg("-@")
        .arg(argfile.path())
        .stdout(Stdio::from(scratch.reopen()?));

    debug!(files = block.len(), ?tool, "Running metadata tool");
    let output = command.output().map_err(|e| Error::MetadataTool {
        message: format!("Failed to execute {}: {}", tool.display(), e),
    })?;

    let json_str = fs::read_to_string(scratch.path())?;
    if json_str.trim().is_empty() {
        // exiftool exits 1 with empty output when no file could be read
        return Err(Error::MetadataTool {
            message: format!(
                "No output (exit {:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    parse_tool_output(&json_str)
}

/// Parse the tool's JSON array into per-file raw tag lists
pub fn parse_tool_output(json_str: &str) -> Result<HashMap<PathBuf, RawTags>> {
    let json: Value = serde_json::from_str(json_str).map_err(|e| Error::MetadataTool {
        message: format!("Failed to parse tool JSON: {}", e),
    })?;

    let entries = json.as_array().ok_or_else(|| Error::MetadataTool {
        message: "Tool output is not a JSON array".into(),
    })?;

    let mut result = HashMap::with_capacity(entries.len());
    for entry in entries {
        let Some(source) = entry.get("SourceFile").and_then(Value::as_str) else {
            continue;
        };

        let tags: RawTags = DateSource::METADATA_TAGS
            .iter()
            .filter_map(|tag| {
                let value = entry.get(tag.tag_name())?;
                let raw = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((*tag, raw))
            })
            .collect();

        trace!(source, tags = tags.len(), "Parsed tool entry");
        result.insert(normalize_path(Path::new(source)), tags);
    }

    Ok(result)
}
