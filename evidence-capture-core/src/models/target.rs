use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;

/// Container format an encode target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase", tag = "codec")]
pub enum EncodeFormat {
    /// Uncompressed PCM16 in a RIFF container, written in-process.
    Wav,
    /// MPEG layer III via the external encoder.
    Mp3 { bitrate_kbps: u32 },
    /// Vorbis in an Ogg container via the external encoder.
    Ogg,
    /// FLAC via the external encoder.
    Flac,
    /// AAC in a fragmented MP4 container via the external encoder.
    M4a { bitrate_kbps: u32 },
}

impl EncodeFormat {
    /// Canonical file extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            EncodeFormat::Wav => "wav",
            EncodeFormat::Mp3 { .. } => "mp3",
            EncodeFormat::Ogg => "ogg",
            EncodeFormat::Flac => "flac",
            EncodeFormat::M4a { .. } => "m4a",
        }
    }

    /// Whether this format is produced by the in-process writer rather than
    /// the external encoder.
    pub fn is_native(&self) -> bool {
        matches!(self, EncodeFormat::Wav)
    }
}

impl std::fmt::Display for EncodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// One output of a capture session: a format paired with its destination,
/// cut on a stated sample clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeTarget {
    pub format: EncodeFormat,
    /// Sample clock this target expects, in Hz. Must agree with any sibling
    /// target and with the capture stream the session runs on.
    pub sample_rate: u32,
    pub path: PathBuf,
}

impl EncodeTarget {
    pub fn new(format: EncodeFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            sample_rate: StreamSpec::default().sample_rate,
            path: path.into(),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Builds a target under `dir` named `rec_<timestamp>.<ext>`, matching
    /// the recorder's on-disk naming convention.
    pub fn timestamped(format: EncodeFormat, dir: impl AsRef<Path>, at: DateTime<Utc>) -> Self {
        let name = format!("rec_{}.{}", at.format("%Y%m%d-%H%M%S"), format.extension());
        Self::new(format, dir.as_ref().join(name))
    }

    /// The session's second output under the same convention:
    /// `rec_<timestamp>_2.<ext>`.
    pub fn timestamped_secondary(
        format: EncodeFormat,
        dir: impl AsRef<Path>,
        at: DateTime<Utc>,
    ) -> Self {
        let name = format!("rec_{}_2.{}", at.format("%Y%m%d-%H%M%S"), format.extension());
        Self::new(format, dir.as_ref().join(name))
    }
}

/// Validates a target set before a session starts.
///
/// A session drives one or two targets off a single capture clock; every
/// target must write to its own path.
pub fn validate_targets(targets: &[EncodeTarget]) -> Result<(), CaptureError> {
    if targets.is_empty() {
        return Err(CaptureError::InvalidTarget(
            "at least one encode target is required".into(),
        ));
    }
    if targets.len() > 2 {
        return Err(CaptureError::InvalidTarget(format!(
            "at most two encode targets are supported, got {}",
            targets.len()
        )));
    }
    for (i, a) in targets.iter().enumerate() {
        if a.path.as_os_str().is_empty() {
            return Err(CaptureError::InvalidTarget(
                "encode target path is empty".into(),
            ));
        }
        for b in &targets[i + 1..] {
            if a.path == b.path {
                return Err(CaptureError::InvalidTarget(format!(
                    "duplicate encode target path: {}",
                    a.path.display()
                )));
            }
            if a.sample_rate != b.sample_rate {
                return Err(CaptureError::InvalidTarget(format!(
                    "encode targets disagree on the sample clock: {} Hz vs {} Hz",
                    a.sample_rate, b.sample_rate
                )));
            }
        }
    }
    if let Some(bad) = targets.iter().find(|t| match t.format {
        EncodeFormat::Mp3 { bitrate_kbps } | EncodeFormat::M4a { bitrate_kbps } => {
            bitrate_kbps == 0
        }
        _ => false,
    }) {
        return Err(CaptureError::InvalidTarget(format!(
            "zero bitrate for {} target",
            bad.format
        )));
    }
    Ok(())
}
