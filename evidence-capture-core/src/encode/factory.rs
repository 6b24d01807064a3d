use crate::encode::command::CommandEncoder;
use crate::encode::wav::WavEncoder;
use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;
use crate::models::target::{EncodeFormat, EncodeTarget};
use crate::traits::encode_sink::{EncodeSink, SinkFactory};

/// Routes each target to its sink implementation: WAV through the
/// in-process writer, everything else through the external encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSinkFactory;

impl DefaultSinkFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SinkFactory for DefaultSinkFactory {
    fn open(
        &self,
        target: &EncodeTarget,
        spec: &StreamSpec,
    ) -> Result<Box<dyn EncodeSink>, CaptureError> {
        match target.format {
            EncodeFormat::Wav => Ok(Box::new(WavEncoder::open(&target.path, spec)?)),
            _ => Ok(Box::new(CommandEncoder::spawn(target, spec)?)),
        }
    }
}
