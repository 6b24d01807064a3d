use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;
use crate::processing::{pcm, wav_format};
use crate::storage::hashed_writer::HashedFileWriter;
use crate::traits::encode_sink::{EncodeSink, SinkClosure};

/// Built-in PCM16 WAV sink.
///
/// Writes the 44-byte streaming header at open and appends raw frame
/// bytes; header and data all pass through the hashed writer.
pub struct WavEncoder {
    writer: HashedFileWriter,
}

impl WavEncoder {
    pub fn open(path: &Path, spec: &StreamSpec) -> Result<Self, CaptureError> {
        let mut writer = HashedFileWriter::create(path)?;
        let header = wav_format::streaming_wav_header(spec.sample_rate, spec.channels);
        writer.write(&header)?;
        Ok(Self { writer })
    }
}

impl EncodeSink for WavEncoder {
    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        self.writer.write(&pcm::samples_to_bytes(samples))
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        self.writer.flush()
    }

    fn close(self: Box<Self>) -> Result<SinkClosure, CaptureError> {
        self.writer.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::hashing::Digest;
    use std::fs;

    #[test]
    fn writes_header_then_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.wav");
        let spec = StreamSpec::default();

        let mut sink = Box::new(WavEncoder::open(&path, &spec).unwrap());
        sink.write(&[0i16, 100, -100, 3000]).unwrap();
        sink.write(&[1i16, 2]).unwrap();
        let closure = sink.close().unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 44 + 12);
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[36..40], b"data");
        assert_eq!(closure.bytes_written, data.len() as u64);
        assert_eq!(closure.digest, Digest::of(&data));
    }

    #[test]
    fn header_reflects_the_stream_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.wav");
        let spec = StreamSpec {
            sample_rate: 44_100,
            channels: 2,
            frame_samples: 512,
        };

        let sink = Box::new(WavEncoder::open(&path, &spec).unwrap());
        sink.close().unwrap();

        let data = fs::read(&path).unwrap();
        let sample_rate = u32::from_le_bytes([data[24], data[25], data[26], data[27]]);
        let channels = u16::from_le_bytes([data[22], data[23]]);
        assert_eq!(sample_rate, 44_100);
        assert_eq!(channels, 2);
    }
}
