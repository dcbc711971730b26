//! File identity: modification time, size and content digest.
//!
//! The (mtime, size) pair comes from a single metadata call and is the cheap
//! side of change detection; the SHA-256 digest is streamed in fixed-size
//! chunks so memory stays bounded regardless of file size, and is only
//! computed when metadata alone cannot decide staleness.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Chunk size for streaming hash computation (8 KiB)
const HASH_CHUNK_SIZE: usize = 8192;

/// A file's observed state at last successful upload. Superseded by a fresh
/// identity after a re-upload, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Last modified time, seconds since the Unix epoch
    pub mtime: f64,

    /// File size in bytes
    pub size: u64,

    /// Hex-encoded SHA-256 of the content
    pub digest: String,
}

/// Fetch (mtime, size) with one metadata call.
pub fn probe(path: &Path) -> std::io::Result<(f64, u64)> {
    let metadata = std::fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    Ok((mtime, metadata.len()))
}

/// Stream the file content through SHA-256.
pub fn digest(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Full identity of a file: metadata probe plus content digest.
pub fn identity(path: &Path) -> std::io::Result<FileIdentity> {
    let (mtime, size) = probe(path)?;
    let digest = digest(path)?;
    Ok(FileIdentity {
        mtime,
        size,
        digest,
    })
}
