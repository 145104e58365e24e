//! Content signatures for duplicate detection
//!
//! Two stages are used:
//! - a cheap xxHash3 over the first few KiB, only to split size-collision
//!   buckets before the expensive pass
//! - a full BLAKE3 digest, which is the actual equality test

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

/// Read buffer for full-file hashing (256KB)
const READ_CHUNK: usize = 256 * 1024;

/// Hex-encoded BLAKE3 digest of a file's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentSignature(String);

impl ContentSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form used as a human-readable group id
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the full-content signature of a file
pub fn compute_signature(path: &Path) -> Result<ContentSignature> {
    let mut file = File::open(path).map_err(|e| Error::HashComputation {
        path: path.to_path_buf(),
        message: format!("Failed to open file: {}", e),
    })?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| Error::HashComputation {
            path: path.to_path_buf(),
            message: format!("Failed to read file: {}", e),
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let signature = ContentSignature(hasher.finalize().to_hex().to_string());
    trace!(?path, signature = %signature.short(), "Computed content signature");
    Ok(signature)
}

/// Quick hash of the first `limit` bytes
pub fn compute_prefix_hash(path: &Path, limit: usize) -> Result<u64> {
    let file = File::open(path)?;
    let mut buffer = Vec::with_capacity(limit);
    file.take(limit as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| Error::HashComputation {
            path: path.to_path_buf(),
            message: format!("Failed to read file head: {}", e),
        })?;

    Ok(xxh3_64(&buffer))
}
