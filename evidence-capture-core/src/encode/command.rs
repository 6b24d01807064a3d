use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;
use crate::models::target::{EncodeFormat, EncodeTarget};
use crate::processing::pcm;
use crate::storage::hashed_writer::HashedFileWriter;
use crate::traits::encode_sink::{EncodeSink, SinkClosure};

const ENCODER_BIN: &str = "ffmpeg";

/// How long `close` waits for the encoder to drain after stdin EOF before
/// killing it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// External-encoder sink: spawns the encoder process, feeds it raw PCM16
/// on stdin, and pumps its encoded stdout through the hashed writer.
///
/// The encoder never touches the output file itself; this process persists
/// the encoded stream, so the closure digest covers exactly the bytes on
/// disk, same as the native WAV path.
pub struct CommandEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    pump: Option<JoinHandle<Result<SinkClosure, CaptureError>>>,
}

impl CommandEncoder {
    pub fn spawn(target: &EncodeTarget, spec: &StreamSpec) -> Result<Self, CaptureError> {
        let args = encoder_args(&target.format, spec)?;
        let writer = HashedFileWriter::create(&target.path)?;

        debug!("spawning encoder: {} {}", ENCODER_BIN, args.join(" "));
        let mut child = Command::new(ENCODER_BIN)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CaptureError::InvalidTarget(format!(
                    "failed to spawn encoder '{}': {}",
                    ENCODER_BIN, e
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            CaptureError::InvalidTarget("encoder stdin was not piped".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::InvalidTarget("encoder stdout was not piped".into())
        })?;

        let pump = std::thread::Builder::new()
            .name("encode-pump".into())
            .spawn(move || pump_encoded_output(stdout, writer))
            .map_err(|e| CaptureError::Storage(format!("failed to spawn pump thread: {}", e)))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            pump: Some(pump),
        })
    }

    /// Close stdin, give the encoder time to drain, then kill it if it is
    /// still running. Returns the exit outcome as an error string, if any.
    fn shut_down_child(&mut self) -> Option<String> {
        drop(self.stdin.take());
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) if status.success() => return None,
                Ok(Some(status)) => {
                    return Some(format!("encoder exited with {}", status));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!("encoder did not exit within {:?}, killing it", SHUTDOWN_TIMEOUT);
                        let _ = self.child.kill();
                        let _ = self.child.wait();
                        return Some("encoder killed after shutdown timeout".into());
                    }
                    std::thread::sleep(SHUTDOWN_POLL);
                }
                Err(e) => return Some(format!("failed to reap encoder: {}", e)),
            }
        }
    }
}

impl EncodeSink for CommandEncoder {
    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        let stdin = self.stdin.as_mut().ok_or(CaptureError::ClosedSink)?;
        stdin
            .write_all(&pcm::samples_to_bytes(samples))
            .map_err(|e| CaptureError::EncodeWrite(format!("encoder rejected frame: {}", e)))
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        let stdin = self.stdin.as_mut().ok_or(CaptureError::ClosedSink)?;
        stdin
            .flush()
            .map_err(|e| CaptureError::EncodeWrite(format!("encoder flush failed: {}", e)))
    }

    fn close(mut self: Box<Self>) -> Result<SinkClosure, CaptureError> {
        let exit_failure = self.shut_down_child();
        let pump = self.pump.take().ok_or(CaptureError::ClosedSink)?;
        let closure = pump
            .join()
            .map_err(|_| CaptureError::Storage("encoder pump thread panicked".into()))??;
        match exit_failure {
            // A clean finalize requires a clean encoder exit; a killed or
            // failed encoder leaves a stream with no trailer.
            Some(reason) => Err(CaptureError::EncodeWrite(reason)),
            None => Ok(closure),
        }
    }
}

impl Drop for CommandEncoder {
    fn drop(&mut self) {
        // Reached only when the sink is discarded without `close`.
        if let Some(pump) = self.pump.take() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
            let _ = pump.join();
        }
    }
}

fn pump_encoded_output(
    mut stdout: ChildStdout,
    mut writer: HashedFileWriter,
) -> Result<SinkClosure, CaptureError> {
    let mut buf = [0u8; 8192];
    loop {
        let n = stdout
            .read(&mut buf)
            .map_err(|e| CaptureError::Storage(format!("failed to read encoder output: {}", e)))?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n])?;
    }
    writer.finalize()
}

/// Encoder argument table, one line per format.
///
/// Input is always raw interleaved PCM16 on stdin; output always goes to
/// stdout so this process can persist it. M4A uses fragmented MP4 because
/// plain MP4 needs a seekable output.
fn encoder_args(format: &EncodeFormat, spec: &StreamSpec) -> Result<Vec<String>, CaptureError> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        spec.sample_rate.to_string(),
        "-ac".into(),
        spec.channels.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];

    match format {
        EncodeFormat::Wav => {
            return Err(CaptureError::InvalidTarget(
                "wav targets are written natively, not via the external encoder".into(),
            ));
        }
        EncodeFormat::Mp3 { bitrate_kbps } => {
            args.extend(["-f", "mp3", "-b:a"].map(String::from));
            args.push(format!("{}k", bitrate_kbps));
        }
        EncodeFormat::Ogg => {
            args.extend(["-f", "ogg", "-c:a", "libvorbis", "-q:a", "4"].map(String::from));
        }
        EncodeFormat::Flac => {
            args.extend(["-f", "flac", "-compression_level", "8"].map(String::from));
        }
        EncodeFormat::M4a { bitrate_kbps } => {
            args.extend(["-f", "mp4", "-c:a", "aac", "-b:a"].map(String::from));
            args.push(format!("{}k", bitrate_kbps));
            args.extend(["-movflags", "+frag_keyframe+empty_moov"].map(String::from));
        }
    }

    args.push("pipe:1".into());
    Ok(args)
}
