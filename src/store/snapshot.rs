//! Snapshot file format shared by the file-backed store and index.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (128 bytes, fixed)            │
//! │  magic: [u8; 8]                      │
//! │  version: u32                        │
//! │  flags: u32                          │
//! │  entry_count: u64                    │
//! │  payload_len: u64                    │
//! │  sha256_payload: [u8; 32]            │
//! │  (padding to 128 bytes)              │
//! ├──────────────────────────────────────┤
//! │ PAYLOAD (variable)                   │
//! │  bincode-serialized contents         │
//! └──────────────────────────────────────┘
//! ```
//!
//! Snapshots are written to a sibling temp file and renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};

/// Magic bytes of a key/value store snapshot.
pub const STORE_MAGIC: &[u8; 8] = b"ARCHVKV\0";

/// Magic bytes of an inverted index snapshot.
pub const INDEX_MAGIC: &[u8; 8] = b"ARCHVIX\0";

/// Current snapshot format version.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 128;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SnapshotHeader {
    magic: [u8; 8],
    version: u32,
    flags: u32,
    entry_count: u64,
    payload_len: u64,
    sha256_payload: [u8; 32],
}

impl SnapshotHeader {
    fn validate(&self, magic: &[u8; 8]) -> std::result::Result<(), String> {
        if self.magic != *magic {
            return Err("Invalid magic bytes".into());
        }
        if self.version != FORMAT_VERSION {
            return Err(format!(
                "Incompatible format version: expected {FORMAT_VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}

/// Load a snapshot. Returns `None` if the file does not exist; any damage is an error.
pub fn load<T: DeserializeOwned>(path: &Path, magic: &[u8; 8]) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
    let invalid = |reason: String| ArchiveError::InvalidStore {
        path: path.to_path_buf(),
        reason,
    };

    if data.len() < HEADER_SIZE {
        return Err(invalid("File too small for header".into()));
    }

    let header: SnapshotHeader = bincode::deserialize(&data[..HEADER_SIZE])
        .map_err(|e| invalid(format!("Header deserialization failed: {e}")))?;
    header.validate(magic).map_err(invalid)?;

    let payload = &data[HEADER_SIZE..];
    if payload.len() as u64 != header.payload_len {
        return Err(invalid(format!(
            "Payload length mismatch: header says {}, file has {}",
            header.payload_len,
            payload.len()
        )));
    }
    if sha256(payload) != header.sha256_payload {
        return Err(invalid("Payload checksum mismatch".into()));
    }

    let value = bincode::deserialize(payload)
        .map_err(|e| invalid(format!("Payload deserialization failed: {e}")))?;
    debug!(path = %path.display(), entries = header.entry_count, "Loaded snapshot");
    Ok(Some(value))
}

/// Write a snapshot atomically (temp file + rename).
pub fn save<T: Serialize>(path: &Path, magic: &[u8; 8], value: &T, entry_count: u64) -> Result<()> {
    let payload = bincode::serialize(value)
        .map_err(|e| ArchiveError::codec(&path.display().to_string(), e))?;

    let header = SnapshotHeader {
        magic: *magic,
        version: FORMAT_VERSION,
        flags: 0,
        entry_count,
        payload_len: payload.len() as u64,
        sha256_payload: sha256(&payload),
    };
    let header_bytes = bincode::serialize(&header)
        .map_err(|e| ArchiveError::codec(&path.display().to_string(), e))?;

    let mut padded_header = vec![0u8; HEADER_SIZE];
    let copy_len = header_bytes.len().min(HEADER_SIZE);
    padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
    }

    let tmp = temp_path_for(path);
    {
        let mut file = File::create(&tmp).map_err(|e| ArchiveError::io(&tmp, e))?;
        file.write_all(&padded_header)
            .map_err(|e| ArchiveError::io(&tmp, e))?;
        file.write_all(&payload)
            .map_err(|e| ArchiveError::io(&tmp, e))?;
        file.sync_all().map_err(|e| ArchiveError::io(&tmp, e))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| ArchiveError::io(path, e))?;
    info!(path = %path.display(), entries = entry_count, "Snapshot written");
    Ok(())
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Example: `/data/store.bin` → `/data/.store.bin.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let filename = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{filename}.tmp"))
}
