use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;
use crate::models::target::EncodeTarget;
use crate::processing::hashing::Digest;

/// What a sink reports when it finalizes cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkClosure {
    /// Digest over every byte persisted to the output, in write order.
    pub digest: Digest,
    /// Total bytes persisted.
    pub bytes_written: u64,
}

/// One target's encode backend: accepts raw PCM16 frames and persists the
/// encoded stream to the target path.
///
/// A sink is opened by its factory, written from exactly one worker thread,
/// and consumed by `close`. Every byte it persists must pass through its
/// hashing sink first, so the closure digest equals the digest of the
/// finished file.
pub trait EncodeSink: Send {
    /// Append one frame of interleaved PCM16 samples.
    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError>;

    /// Force any buffered bytes down to the file.
    fn flush(&mut self) -> Result<(), CaptureError>;

    /// Finalize the output and report what was written. At most once; the
    /// sink is gone afterwards.
    fn close(self: Box<Self>) -> Result<SinkClosure, CaptureError>;
}

/// Builds one opened sink per target at session start.
///
/// Injectable through `SessionConfig`; the default factory covers the
/// built-in WAV writer and external-encoder formats.
pub trait SinkFactory: Send + Sync {
    fn open(
        &self,
        target: &EncodeTarget,
        spec: &StreamSpec,
    ) -> Result<Box<dyn EncodeSink>, CaptureError>;
}
