// src/parity/provenance.rs
//
// Executable fingerprints, printed in the run header so a report can be tied
// back to the two builds that produced it.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::workspace::Variant;

/// SHA-256 fingerprint of one simulator build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableInfo {
    pub variant: Variant,
    pub path: PathBuf,
    /// Lowercase hex digest.
    pub sha256: String,
}

impl ExecutableInfo {
    /// Hash the executable at `path`.
    pub fn capture(variant: Variant, path: &Path) -> Result<Self> {
        Ok(Self {
            variant,
            path: path.to_path_buf(),
            sha256: hash_file_sha256(path)?,
        })
    }

    /// First 12 hex characters of the digest.
    pub fn short(&self) -> &str {
        &self.sha256[..self.sha256.len().min(12)]
    }

    /// File name of the executable, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Streaming SHA-256 of a file, hex encoded.
fn hash_file_sha256(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
