use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::ledger::{SessionLedger, TargetRecord};
use crate::processing::hashing::{Digest, HashingSink};

/// Outcome of re-checking one recorded target against the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    MissingFile,
    SizeMismatch { expected: u64, actual: u64 },
    DigestMismatch,
    NotVerifiable { reason: String },
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Verified => f.write_str("verified"),
            Verdict::MissingFile => f.write_str("file missing"),
            Verdict::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {} bytes, found {}", expected, actual)
            }
            Verdict::DigestMismatch => f.write_str("digest mismatch"),
            Verdict::NotVerifiable { reason } => write!(f, "not verifiable: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetVerdict {
    pub path: PathBuf,
    pub format: String,
    pub verdict: Verdict,
}

/// Result of verifying every target of a sealed ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub session_id: String,
    pub verdicts: Vec<TargetVerdict>,
}

impl VerifyReport {
    pub fn all_verified(&self) -> bool {
        !self.verdicts.is_empty() && self.verdicts.iter().all(|v| v.verdict.is_verified())
    }
}

/// Streaming SHA-256 of a file, read in 4 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<Digest, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::Storage(format!("failed to open file for checksum: {}", e)))?;
    let mut sink = HashingSink::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| CaptureError::Storage(format!("failed to read file for checksum: {}", e)))?;
        if n == 0 {
            break;
        }
        sink.update(&buf[..n])?;
    }
    sink.finalize()
}

/// Re-hash every recording named by a sealed ledger and compare digest and
/// byte count against the record.
pub fn verify_ledger(ledger: &SessionLedger) -> VerifyReport {
    let verdicts = ledger
        .targets
        .iter()
        .map(|record| {
            let path = PathBuf::from(&record.path);
            let verdict = check_target(record, &path);
            TargetVerdict {
                path,
                format: record.format.clone(),
                verdict,
            }
        })
        .collect();
    VerifyReport {
        session_id: ledger.session_id.clone(),
        verdicts,
    }
}

fn check_target(record: &TargetRecord, path: &Path) -> Verdict {
    let Some(expected_hex) = &record.sha256 else {
        return Verdict::NotVerifiable {
            reason: "no digest recorded".into(),
        };
    };
    let Some(expected) = Digest::parse_hex(expected_hex) else {
        return Verdict::NotVerifiable {
            reason: "recorded digest is not valid hex".into(),
        };
    };
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Verdict::MissingFile,
    };
    if metadata.len() != record.bytes_written {
        return Verdict::SizeMismatch {
            expected: record.bytes_written,
            actual: metadata.len(),
        };
    }
    match sha256_file(path) {
        Ok(actual) if actual == expected => Verdict::Verified,
        Ok(_) => Verdict::DigestMismatch,
        Err(e) => Verdict::NotVerifiable {
            reason: e.to_string(),
        },
    }
}
