use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::config::SessionConfig;
use crate::models::error::CaptureError;
use crate::models::frame::AudioFrame;
use crate::models::ledger::{LedgerStatus, SealContext, SessionLedger};
use crate::models::state::SessionState;
use crate::models::target::{validate_targets, EncodeTarget};
use crate::session::coordinator::{DualFormatCoordinator, FailureHook};
use crate::session::monitor::{FileGrowthMonitor, MonitorEvent, MonitorObserver};
use crate::storage::sidecar;
use crate::traits::delegate::{SessionDelegate, SessionEvent};
use crate::traits::input_device::{DeviceInfo, FrameCallback, InputDevice};

/// External encoders flush their output in bursts; growth watches on their
/// files use this interval instead of the frame period.
const ENCODER_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

enum Teardown {
    Live,
    Sealed(SessionLedger),
}

struct SessionCore {
    id: Uuid,
    device_info: DeviceInfo,
    config: SessionConfig,
    started_at: DateTime<Utc>,
    delegate: Arc<dyn SessionDelegate>,
    state: Mutex<SessionState>,
    /// Gate for the capture callback; false before recording and from the
    /// moment teardown begins.
    accepting: AtomicBool,
    frames_captured: AtomicU64,
    device: Mutex<Option<Box<dyn InputDevice>>>,
    coordinator: Mutex<Option<DualFormatCoordinator>>,
    monitor: Mutex<Option<FileGrowthMonitor>>,
    /// First abort reason wins; consulted when the ledger is sealed.
    abort_reason: Mutex<Option<String>>,
    /// Serializes stop and abort, and stores the sealed ledger so a second
    /// stop returns the same record.
    teardown: Mutex<Teardown>,
}

/// One recording session: a single device fanned out to one or two encode
/// targets, supervised and sealed into a [`SessionLedger`].
///
/// Sessions are single-use. `start` opens everything or nothing; `stop`
/// drains and finalizes; `abort` discards the backlog and marks the ledger
/// aborted. Dropping a live session aborts it.
pub struct CaptureSession {
    core: Arc<SessionCore>,
}

impl CaptureSession {
    /// Opens every encode target and the device, then begins capturing.
    ///
    /// Nothing is left behind on failure: an unavailable device means no
    /// files are touched, and a target or device that fails to open closes
    /// and removes everything opened before it.
    pub fn start(
        mut device: Box<dyn InputDevice>,
        targets: Vec<EncodeTarget>,
        config: SessionConfig,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<CaptureSession, CaptureError> {
        config.validate().map_err(CaptureError::InvalidConfig)?;
        validate_targets(&targets)?;
        if let Some(bad) = targets
            .iter()
            .find(|t| t.sample_rate != config.stream.sample_rate)
        {
            return Err(CaptureError::InvalidTarget(format!(
                "target {} expects {} Hz but the capture clock runs at {} Hz",
                bad.path.display(),
                bad.sample_rate,
                config.stream.sample_rate
            )));
        }

        let device_info = device.info();
        if !device.is_available() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "input device {} is not available",
                device_info.id
            )));
        }

        let id = Uuid::new_v4();
        info!(
            "starting session {id} on {} ({} targets)",
            device_info.name,
            targets.len()
        );

        let core = Arc::new(SessionCore {
            id,
            device_info,
            config: config.clone(),
            started_at: Utc::now(),
            delegate: Arc::clone(&delegate),
            state: Mutex::new(SessionState::Idle),
            accepting: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
            device: Mutex::new(None),
            coordinator: Mutex::new(None),
            monitor: Mutex::new(None),
            abort_reason: Mutex::new(None),
            teardown: Mutex::new(Teardown::Live),
        });

        let failure_hook: FailureHook = {
            let weak = Arc::downgrade(&core);
            Arc::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.handle_target_failure();
                }
            })
        };
        let coordinator = DualFormatCoordinator::start_both(
            &targets,
            &config,
            Arc::clone(&delegate),
            failure_hook,
        )?;

        let observer: MonitorObserver = {
            let weak = Arc::downgrade(&core);
            Arc::new(move |event: &MonitorEvent| {
                if let Some(core) = weak.upgrade() {
                    core.handle_monitor_event(event);
                }
            })
        };
        let monitor = FileGrowthMonitor::new(config.monitor, observer);
        let frame_period = config.stream.frame_period();
        for target in coordinator.targets() {
            let expected = if target.format.is_native() {
                frame_period
            } else {
                ENCODER_FLUSH_INTERVAL
            };
            monitor.attach(target.path.clone(), expected);
        }

        *core.coordinator.lock() = Some(coordinator);
        *core.monitor.lock() = Some(monitor);
        core.accepting.store(true, Ordering::SeqCst);

        // The device comes up last, once every pipeline can take frames,
        // so nothing it delivers is lost. The callback holds a weak handle;
        // frames delivered after the session is gone fall on the floor.
        let callback: FrameCallback = {
            let weak = Arc::downgrade(&core);
            Arc::new(move |samples: &[i16]| {
                if let Some(core) = weak.upgrade() {
                    core.on_frame(samples);
                }
            })
        };
        if let Err(e) = device.open(config.stream, callback) {
            core.accepting.store(false, Ordering::SeqCst);
            let monitor = core.monitor.lock().take();
            drop(monitor);
            if let Some(coordinator) = core.coordinator.lock().take() {
                coordinator.stop_both(false);
            }
            for target in &targets {
                let _ = fs::remove_file(&target.path);
            }
            return Err(e);
        }
        *core.device.lock() = Some(device);

        core.set_state(SessionState::Recording);
        Ok(CaptureSession { core })
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn state(&self) -> SessionState {
        *self.core.state.lock()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.core.device_info
    }

    /// Frames accepted from the device so far.
    pub fn frames_captured(&self) -> u64 {
        self.core.frames_captured.load(Ordering::SeqCst)
    }

    /// Stops capturing, drains the queued backlog into every sink,
    /// finalizes them and seals the ledger.
    ///
    /// Idempotent: a second stop returns the ledger sealed by the first.
    /// An abort that raced this stop wins; the returned ledger is then
    /// marked aborted.
    pub fn stop(&self) -> Result<SessionLedger, CaptureError> {
        let mut teardown = self.core.teardown.lock();
        if let Teardown::Sealed(ledger) = &*teardown {
            debug!("stop on sealed session {}", self.core.id);
            return Ok(ledger.clone());
        }
        self.core.set_state(SessionState::Stopping);
        let ledger = self.core.teardown_locked(true);
        *teardown = Teardown::Sealed(ledger.clone());
        Ok(ledger)
    }

    /// Discards the session: the backlog is dropped, sinks are closed, and
    /// the ledger is sealed as aborted with `reason`.
    ///
    /// Racing a stop, the abort wins. On a session that already sealed a
    /// non-aborted ledger this returns `InvalidState`.
    pub fn abort(&self, reason: &str) -> Result<SessionLedger, CaptureError> {
        self.core.abort_core(reason)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let live = matches!(&*self.core.teardown.lock(), Teardown::Live);
        if live {
            warn!("session {} dropped while live; aborting", self.core.id);
            if let Err(e) = self.core.abort_core("session handle dropped") {
                debug!("drop abort skipped: {e}");
            }
        }
    }
}

impl SessionCore {
    fn set_state(&self, new_state: SessionState) {
        {
            let mut state = self.state.lock();
            *state = new_state;
        }
        self.delegate.on_state_changed(new_state);
    }

    /// Capture callback: stamp the frame and offer it to every target.
    /// Runs on the device's delivery thread and never blocks.
    fn on_frame(&self, samples: &[i16]) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        let seq = self.frames_captured.fetch_add(1, Ordering::SeqCst);
        let offset = self.config.stream.frame_period().mul_f64(seq as f64);
        let frame = AudioFrame::new(seq, offset, Arc::from(samples));
        if let Some(coordinator) = &*self.coordinator.lock() {
            coordinator.fan_out(frame);
        }
    }

    /// A target failed. If nothing healthy remains the session has no
    /// reason to keep running; seal it as aborted from a fresh thread,
    /// since this may be called from the failing worker itself.
    fn handle_target_failure(self: Arc<Self>) {
        if !self.accepting.load(Ordering::SeqCst) {
            // Already tearing down; the seal will record the failure.
            return;
        }
        let healthy = self
            .coordinator
            .lock()
            .as_ref()
            .map(|c| c.healthy_targets())
            .unwrap_or(0);
        if healthy > 0 {
            return;
        }
        error!("session {}: no healthy targets remain", self.id);
        let core = Arc::clone(&self);
        let spawned = thread::Builder::new()
            .name("session-teardown".into())
            .spawn(move || {
                if let Err(e) = core.abort_core("all encode targets failed") {
                    debug!("redundant teardown skipped: {e}");
                }
            });
        if let Err(e) = spawned {
            error!("failed to spawn teardown thread: {e}");
        }
    }

    fn handle_monitor_event(self: Arc<Self>, event: &MonitorEvent) {
        match event {
            MonitorEvent::Stall { path, .. } => {
                warn!("output stalled: {}", path.display());
                if let Some(coordinator) = &*self.coordinator.lock() {
                    coordinator.record_stall(path);
                }
                self.delegate.on_event(&SessionEvent::StallDetected {
                    path: path.clone(),
                });
            }
            MonitorEvent::Corruption { path, detail } => {
                error!("output corrupted: {}: {detail}", path.display());
                let marked = self
                    .coordinator
                    .lock()
                    .as_ref()
                    .map(|c| c.mark_target_failed(path, &format!("file corruption: {detail}")))
                    .unwrap_or(false);
                self.delegate.on_event(&SessionEvent::CorruptionDetected {
                    path: path.clone(),
                    detail: detail.clone(),
                });
                if marked {
                    self.handle_target_failure();
                }
            }
        }
    }

    fn abort_core(&self, reason: &str) -> Result<SessionLedger, CaptureError> {
        // Record the intent before taking the teardown lock: an in-flight
        // stop consults it at seal time, so a stop/abort race always
        // settles on aborted.
        {
            let mut slot = self.abort_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_string());
            }
        }
        self.accepting.store(false, Ordering::SeqCst);

        let mut teardown = self.teardown.lock();
        match &*teardown {
            Teardown::Sealed(ledger) if matches!(ledger.status, LedgerStatus::Aborted { .. }) => {
                Ok(ledger.clone())
            }
            Teardown::Sealed(_) => Err(CaptureError::InvalidState(
                "session already finalized".into(),
            )),
            Teardown::Live => {
                warn!("aborting session {}: {reason}", self.id);
                self.set_state(SessionState::Stopping);
                let ledger = self.teardown_locked(false);
                *teardown = Teardown::Sealed(ledger.clone());
                Ok(ledger)
            }
        }
    }

    /// Common teardown. Caller holds the teardown lock and has set the
    /// state to `Stopping`; `drain` decides whether the queued backlog is
    /// encoded or discarded.
    fn teardown_locked(&self, drain: bool) -> SessionLedger {
        self.accepting.store(false, Ordering::SeqCst);

        // Watches come down first so the quiet files of a stopping session
        // are not mistaken for stalls. Dropping the monitor joins its
        // thread.
        let monitor = self.monitor.lock().take();
        drop(monitor);
        self.close_device();

        // Take the coordinator out of its slot before joining the workers;
        // a worker that fails during the drain re-enters the coordinator
        // lock through its failure hook.
        let coordinator = self.coordinator.lock().take();
        let outcomes = match coordinator {
            Some(coordinator) => coordinator.stop_both(drain),
            None => Vec::new(),
        };

        let stopped_at = Utc::now();
        let abort_reason = self.abort_reason.lock().clone();
        let ledger = SessionLedger::seal(
            SealContext {
                session_id: self.id,
                device: self.device_info.name.clone(),
                started_at: self.started_at,
                stopped_at,
                frames_captured: self.frames_captured.load(Ordering::SeqCst),
                stream: self.config.stream,
                abort_reason,
            },
            outcomes,
        );

        if self.config.write_sidecar {
            if let Some(primary) = ledger.targets.first() {
                match sidecar::write_ledger(&ledger, Path::new(&primary.path)) {
                    Ok(path) => debug!("ledger sidecar written to {}", path.display()),
                    Err(e) => error!("failed to write ledger sidecar: {e}"),
                }
            }
        }

        let final_state = match ledger.status {
            LedgerStatus::Aborted { .. } => SessionState::Aborted,
            _ => SessionState::Finalized,
        };
        self.set_state(final_state);
        info!(
            "session {} sealed as {final_state} after {} frames",
            self.id, ledger.frames_captured
        );
        self.delegate.on_sealed(&ledger);
        ledger
    }

    fn close_device(&self) {
        let device = self.device.lock().take();
        if let Some(mut device) = device {
            if let Err(e) = device.close() {
                warn!("failed to close input device: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::synthetic::SyntheticDevice;
    use crate::models::target::EncodeFormat;
    use crate::traits::delegate::NullDelegate;

    fn wav_target(dir: &Path) -> EncodeTarget {
        EncodeTarget::new(EncodeFormat::Wav, dir.join("rec.wav"))
    }

    #[test]
    fn start_rejects_degenerate_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessionConfig::default();
        config.queue_capacity = 0;

        let err = CaptureSession::start(
            Box::new(SyntheticDevice::silence()),
            vec![wav_target(dir.path())],
            config,
            Arc::new(NullDelegate),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));
    }

    #[test]
    fn start_rejects_an_empty_target_list() {
        let err = CaptureSession::start(
            Box::new(SyntheticDevice::silence()),
            Vec::new(),
            SessionConfig::default(),
            Arc::new(NullDelegate),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CaptureError::InvalidTarget(_)));
    }

    #[test]
    fn start_rejects_a_target_off_the_capture_clock() {
        let dir = tempfile::tempdir().unwrap();
        let err = CaptureSession::start(
            Box::new(SyntheticDevice::silence()),
            vec![wav_target(dir.path()).with_sample_rate(44_100)],
            SessionConfig::default(),
            Arc::new(NullDelegate),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CaptureError::InvalidTarget(_)));
        assert!(!dir.path().join("rec.wav").exists());
    }

    #[test]
    fn start_rejects_an_unavailable_device() {
        let dir = tempfile::tempdir().unwrap();
        let err = CaptureSession::start(
            Box::new(SyntheticDevice::unavailable()),
            vec![wav_target(dir.path())],
            SessionConfig::default(),
            Arc::new(NullDelegate),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        // Nothing touched the disk.
        assert!(!dir.path().join("rec.wav").exists());
    }
}
