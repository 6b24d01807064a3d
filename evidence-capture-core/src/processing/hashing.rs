use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::models::error::CaptureError;

/// A finished SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// One-shot digest of a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Parses the 64-character lowercase/uppercase hex rendering.
    pub fn parse_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Running SHA-256 over one output stream.
///
/// Interposed between an encode pipeline and the physical writer: the
/// caller updates it with each chunk in exactly the order the chunk is
/// handed to the writer, so the finalized digest equals the digest of the
/// file on disk. Performs no I/O itself.
///
/// `finalize` consumes the accumulator; any use afterwards fails with
/// `CaptureError::ClosedSink`.
pub struct HashingSink {
    hasher: Option<Sha256>,
    bytes_observed: u64,
}

impl HashingSink {
    pub fn new() -> Self {
        Self {
            hasher: Some(Sha256::new()),
            bytes_observed: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let hasher = self.hasher.as_mut().ok_or(CaptureError::ClosedSink)?;
        hasher.update(bytes);
        self.bytes_observed += bytes.len() as u64;
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<Digest, CaptureError> {
        let hasher = self.hasher.take().ok_or(CaptureError::ClosedSink)?;
        Ok(Digest(hasher.finalize().into()))
    }

    /// Total bytes observed so far.
    pub fn bytes_observed(&self) -> u64 {
        self.bytes_observed
    }
}

impl Default for HashingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_chunk_size_independent() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        let mut whole = HashingSink::new();
        whole.update(&data).unwrap();
        let expected = whole.finalize().unwrap();

        for chunk_size in [1, 7, 64, 4096] {
            let mut sink = HashingSink::new();
            for chunk in data.chunks(chunk_size) {
                sink.update(chunk).unwrap();
            }
            assert_eq!(sink.finalize().unwrap(), expected);
        }

        assert_eq!(Digest::of(&data), expected);
    }

    #[test]
    fn empty_stream_digest_matches_known_vector() {
        let mut sink = HashingSink::new();
        let digest = sink.finalize().unwrap();
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn finalize_is_at_most_once() {
        let mut sink = HashingSink::new();
        sink.update(b"abc").unwrap();
        sink.finalize().unwrap();
        assert_eq!(sink.finalize(), Err(CaptureError::ClosedSink));
    }

    #[test]
    fn update_after_finalize_always_fails() {
        for writes_before in 0..4 {
            let mut sink = HashingSink::new();
            for _ in 0..writes_before {
                sink.update(b"block").unwrap();
            }
            sink.finalize().unwrap();
            assert_eq!(sink.update(b"late"), Err(CaptureError::ClosedSink));
        }
    }

    #[test]
    fn counts_observed_bytes() {
        let mut sink = HashingSink::new();
        sink.update(&[0u8; 100]).unwrap();
        sink.update(&[1u8; 28]).unwrap();
        assert_eq!(sink.bytes_observed(), 128);
    }

    #[test]
    fn hex_round_trip() {
        let digest = Digest::of(b"round trip");
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Digest::parse_hex(&hex), Some(digest));
        assert_eq!(Digest::parse_hex("zz"), None);
    }
}
