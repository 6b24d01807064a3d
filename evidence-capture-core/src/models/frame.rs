use std::sync::Arc;
use std::time::Duration;

/// Geometry of a capture stream: every frame delivered by a device carries
/// `frame_samples * channels` interleaved PCM16 samples at `sample_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Samples per channel in one frame.
    pub frame_samples: u32,
}

impl StreamSpec {
    /// Wall time covered by one frame.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(self.frame_samples as f64 / self.sample_rate as f64)
    }

    /// Total samples in one interleaved frame.
    pub fn samples_per_frame(&self) -> usize {
        self.frame_samples as usize * self.channels as usize
    }

    /// Encoded size of one frame in bytes (PCM16).
    pub fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * 2
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.frame_samples == 0 {
            return Err("frame size must be positive".into());
        }
        Ok(())
    }
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            frame_samples: 2048,
        }
    }
}

/// One captured block of interleaved PCM16 samples.
///
/// Frames are immutable once produced. The session owns a frame until it is
/// fanned out; afterwards every encode pipeline holds a read-only view of
/// the same sample buffer via the shared `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Monotonically increasing per-session sequence number, starting at 0.
    pub seq: u64,
    /// Offset from the session's capture start, on the sample clock.
    pub offset: Duration,
    /// Interleaved PCM16 samples.
    pub samples: Arc<[i16]>,
}

impl AudioFrame {
    pub fn new(seq: u64, offset: Duration, samples: Arc<[i16]>) -> Self {
        Self {
            seq,
            offset,
            samples,
        }
    }

    /// Encoded size of this frame in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_matches_capture_defaults() {
        let spec = StreamSpec::default();
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.frame_samples, 2048);
        assert_eq!(spec.bytes_per_frame(), 4096);
    }

    #[test]
    fn frame_period_is_samples_over_rate() {
        let spec = StreamSpec {
            sample_rate: 48_000,
            channels: 1,
            frame_samples: 4800,
        };
        assert_eq!(spec.frame_period(), Duration::from_millis(100));
    }

    #[test]
    fn validate_rejects_bad_geometry() {
        let mut spec = StreamSpec::default();
        spec.sample_rate = 0;
        assert!(spec.validate().is_err());

        let mut spec = StreamSpec::default();
        spec.channels = 3;
        assert!(spec.validate().is_err());

        let mut spec = StreamSpec::default();
        spec.frame_samples = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn frames_share_sample_storage() {
        let samples: Arc<[i16]> = vec![1, 2, 3, 4].into();
        let a = AudioFrame::new(0, Duration::ZERO, Arc::clone(&samples));
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.samples, &b.samples));
        assert_eq!(a.byte_len(), 8);
    }
}
