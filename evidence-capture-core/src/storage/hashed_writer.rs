use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::processing::hashing::HashingSink;
use crate::traits::encode_sink::SinkClosure;

/// Append-only file writer with the hashing sink interposed.
///
/// Every chunk updates the running digest immediately before it is handed
/// to the file, and nothing ever seeks back, so the digest reported at
/// `finalize` equals the digest of the finished file on disk.
pub struct HashedFileWriter {
    path: PathBuf,
    file: File,
    hash: HashingSink,
    bytes_written: u64,
}

impl HashedFileWriter {
    /// Create the output file, along with any missing parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CaptureError::Storage(format!("failed to create directory: {}", e))
                })?;
            }
        }
        let file = File::create(&path)
            .map_err(|e| CaptureError::Storage(format!("failed to create file: {}", e)))?;
        Ok(Self {
            path,
            file,
            hash: HashingSink::new(),
            bytes_written: 0,
        })
    }

    /// Hash `data`, then append it to the file.
    pub fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.hash.update(data)?;
        self.file
            .write_all(data)
            .map_err(|e| CaptureError::Storage(format!("write failed: {}", e)))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.file
            .flush()
            .map_err(|e| CaptureError::Storage(format!("flush failed: {}", e)))
    }

    /// Flush, close the file, and report digest plus byte count.
    pub fn finalize(mut self) -> Result<SinkClosure, CaptureError> {
        self.flush()?;
        let digest = self.hash.finalize()?;
        Ok(SinkClosure {
            digest,
            bytes_written: self.bytes_written,
        })
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
