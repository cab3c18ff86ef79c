//! Digest spec parsing and streaming checksum verification.
//!
//! A digest spec is `"<algorithm>:<hex>"`. Parsing happens before any
//! hashing work; an unparseable or unsupported spec is a hard verification
//! failure, never silently skipped. Verification streams the file through
//! the hash in bounded reads, so artifact size never affects memory use.

use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid digest spec '{0}', expected 'algorithm:hexhash'")]
    Format(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("digest mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supported digest algorithm families. Extended by adding a variant and a
/// row in the name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed digest spec: algorithm plus lowercase hex value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl Digest {
    /// Parses `"<algorithm>:<hex>"`. Exactly two colon-separated fields;
    /// the algorithm name is matched case-insensitively and the hex value
    /// is normalized to lowercase.
    pub fn parse(spec: &str) -> Result<Self, VerifyError> {
        let fields: Vec<&str> = spec.split(':').collect();
        if fields.len() != 2 || fields[1].is_empty() {
            return Err(VerifyError::Format(spec.to_string()));
        }
        let algorithm = DigestAlgorithm::from_name(fields[0])
            .ok_or_else(|| VerifyError::UnsupportedAlgorithm(fields[0].to_string()))?;
        Ok(Digest {
            algorithm,
            hex: fields[1].to_ascii_lowercase(),
        })
    }
}

/// Verifies the file at `path` against the digest spec.
///
/// Format and unsupported-algorithm errors are returned before the file is
/// opened; a mismatch error carries both expected and actual digests.
pub fn verify(path: &Path, spec: &str) -> Result<(), VerifyError> {
    let digest = Digest::parse(spec)?;
    let actual = match digest.algorithm {
        DigestAlgorithm::Sha256 => sha256_file(path)?,
    };
    if actual != digest.hex {
        return Err(VerifyError::Mismatch {
            expected: digest.hex,
            actual,
        });
    }
    Ok(())
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn sha256_file(path: &Path) -> Result<String, VerifyError> {
    let io_err = |source| VerifyError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut f = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
