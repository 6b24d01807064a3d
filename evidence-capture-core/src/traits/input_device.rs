use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;

/// Callback invoked for every captured block.
///
/// Parameters: one frame of interleaved PCM16 samples, exactly
/// `spec.samples_per_frame()` long. The callback fires on the device's
/// delivery thread and must not block.
pub type FrameCallback = Arc<dyn Fn(&[i16]) + Send + Sync + 'static>;

/// Identity of the device backing an input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

/// Interface for audio input sources.
///
/// Implementations deliver fixed-size PCM16 blocks on their own thread for
/// as long as the device is open. Platform backends (ALSA, WASAPI, Core
/// Audio) plug in here; `SyntheticDevice` is the built-in implementation
/// used by tests and the CLI.
pub trait InputDevice: Send {
    /// Whether the device can currently be opened.
    fn is_available(&self) -> bool;

    /// Open the stream and begin delivering blocks via `callback`.
    fn open(&mut self, spec: StreamSpec, callback: FrameCallback) -> Result<(), CaptureError>;

    /// Stop delivery and release the device. No callback fires after this
    /// returns.
    fn close(&mut self) -> Result<(), CaptureError>;

    /// Identity of the backing device.
    fn info(&self) -> DeviceInfo;
}
