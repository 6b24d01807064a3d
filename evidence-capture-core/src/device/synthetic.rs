use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::debug;

use crate::models::error::CaptureError;
use crate::models::frame::StreamSpec;
use crate::traits::input_device::{DeviceInfo, FrameCallback, InputDevice};

/// Waveform produced by a [`SyntheticDevice`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Silence,
    Sine { freq_hz: f64, amplitude: f64 },
}

/// Deterministic input device backed by a generator thread instead of
/// hardware. Drives sessions in tests and the self-check subcommand.
pub struct SyntheticDevice {
    signal: Signal,
    frame_limit: Option<u64>,
    paced: bool,
    available: bool,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SyntheticDevice {
    pub fn sine(freq_hz: f64) -> Self {
        Self::with_signal(Signal::Sine {
            freq_hz,
            amplitude: 0.5,
        })
    }

    pub fn silence() -> Self {
        Self::with_signal(Signal::Silence)
    }

    /// A device that reports itself unavailable and refuses to open.
    pub fn unavailable() -> Self {
        let mut device = Self::silence();
        device.available = false;
        device
    }

    fn with_signal(signal: Signal) -> Self {
        Self {
            signal,
            frame_limit: None,
            paced: true,
            available: true,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Stop delivering after `frames` frames. The device stays open; close
    /// it as usual.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Deliver frames as fast as possible instead of at the frame period.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl InputDevice for SyntheticDevice {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open(&mut self, spec: StreamSpec, callback: FrameCallback) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable(
                "synthetic device marked unavailable".into(),
            ));
        }
        if self.thread.is_some() {
            return Err(CaptureError::InvalidState("device already open".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let signal = self.signal;
        let frame_limit = self.frame_limit;
        let paced = self.paced;
        let handle = thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || generate(signal, spec, frame_limit, paced, running, callback))
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Stops the generator and waits for it; no callback fires after this
    /// returns.
    fn close(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "synthetic0".into(),
            name: "Synthetic Capture Device".into(),
        }
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn generate(
    signal: Signal,
    spec: StreamSpec,
    frame_limit: Option<u64>,
    paced: bool,
    running: Arc<AtomicBool>,
    callback: FrameCallback,
) {
    let period = spec.frame_period();
    let channels = spec.channels as usize;
    let mut block = vec![0i16; spec.samples_per_frame()];
    let mut sample_index: u64 = 0;
    let mut produced: u64 = 0;

    while running.load(Ordering::SeqCst) {
        if frame_limit.is_some_and(|limit| produced >= limit) {
            break;
        }
        match signal {
            Signal::Silence => block.fill(0),
            Signal::Sine { freq_hz, amplitude } => {
                for i in 0..spec.frame_samples as usize {
                    let t = (sample_index + i as u64) as f64 / spec.sample_rate as f64;
                    let sample = ((TAU * freq_hz * t).sin() * amplitude * i16::MAX as f64) as i16;
                    for ch in 0..channels {
                        block[i * channels + ch] = sample;
                    }
                }
            }
        }
        sample_index += spec.frame_samples as u64;
        produced += 1;
        callback(&block);

        if paced {
            thread::sleep(period);
        } else {
            thread::yield_now();
        }
    }
    debug!("synthetic device delivered {produced} frames");
}
