use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, warn};
use parking_lot::Mutex;

use crate::models::config::SessionConfig;
use crate::models::error::CaptureError;
use crate::models::frame::AudioFrame;
use crate::models::ledger::TargetOutcome;
use crate::models::target::EncodeTarget;
use crate::processing::frame_queue::{FrameQueue, PopOutcome};
use crate::traits::delegate::{SessionDelegate, SessionEvent};
use crate::traits::encode_sink::{EncodeSink, SinkClosure};

/// How long a worker waits for a frame before re-checking its flags.
const WORKER_POLL: Duration = Duration::from_millis(50);

/// Invoked after a target records a failure, so the owning session can
/// decide whether anything healthy is left. Must not block on the worker
/// threads.
pub type FailureHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// State a worker shares with the coordinator.
struct PipelineShared {
    path: PathBuf,
    failed: AtomicBool,
    failure: Mutex<Option<String>>,
    frames_written: AtomicU64,
    stall_episodes: AtomicU32,
    overrun_reported: AtomicBool,
}

impl PipelineShared {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            frames_written: AtomicU64::new(0),
            stall_episodes: AtomicU32::new(0),
            overrun_reported: AtomicBool::new(false),
        }
    }

    /// Records the first failure reason and flags the pipeline. Later
    /// failures keep the original reason.
    fn record_failure(&self, reason: String) {
        {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.failed.store(true, Ordering::SeqCst);
    }
}

struct TargetPipeline {
    target: EncodeTarget,
    queue: Arc<FrameQueue>,
    shared: Arc<PipelineShared>,
    worker: Mutex<Option<thread::JoinHandle<Option<SinkClosure>>>>,
}

/// Drives one sink per encode target from a shared frame source.
///
/// Start is all-or-nothing: the first sink that fails to open closes and
/// removes everything opened before it. Once running, each target has its
/// own queue and worker thread, so a slow or failed target never blocks
/// its sibling or the capture callback.
pub struct DualFormatCoordinator {
    pipelines: Vec<TargetPipeline>,
    delegate: Arc<dyn SessionDelegate>,
}

impl DualFormatCoordinator {
    pub fn start_both(
        targets: &[EncodeTarget],
        config: &SessionConfig,
        delegate: Arc<dyn SessionDelegate>,
        failure_hook: FailureHook,
    ) -> Result<Self, CaptureError> {
        let mut opened: Vec<(EncodeTarget, Box<dyn EncodeSink>)> =
            Vec::with_capacity(targets.len());
        for target in targets {
            match config.sink_factory.open(target, &config.stream) {
                Ok(sink) => opened.push((target.clone(), sink)),
                Err(cause) => {
                    // All-or-nothing: unwind whatever opened before the
                    // failure and leave no partial files behind.
                    for (sibling, sink) in opened {
                        let _ = sink.close();
                        let _ = fs::remove_file(&sibling.path);
                    }
                    let _ = fs::remove_file(&target.path);
                    return Err(CaptureError::InvalidTarget(format!(
                        "failed to open {}: {cause}",
                        target.path.display()
                    )));
                }
            }
        }

        let pipelines = opened
            .into_iter()
            .map(|(target, sink)| {
                let queue = Arc::new(FrameQueue::new(config.queue_capacity, config.overrun_policy));
                let shared = Arc::new(PipelineShared::new(target.path.clone()));

                let worker_queue = Arc::clone(&queue);
                let worker_shared = Arc::clone(&shared);
                let worker_delegate = Arc::clone(&delegate);
                let worker_hook = Arc::clone(&failure_hook);
                let worker = thread::Builder::new()
                    .name(format!("encode-{}", target.format))
                    .spawn(move || {
                        run_worker(
                            worker_queue,
                            sink,
                            worker_shared,
                            worker_delegate,
                            worker_hook,
                        )
                    })
                    .expect("failed to spawn encode worker thread");

                TargetPipeline {
                    target,
                    queue,
                    shared,
                    worker: Mutex::new(Some(worker)),
                }
            })
            .collect();

        Ok(Self {
            pipelines,
            delegate,
        })
    }

    /// Offers one frame to every healthy target. Never blocks: a full
    /// queue sheds load per its overrun policy, and the first loss on a
    /// target raises one `BackpressureOverrun` event.
    pub fn fan_out(&self, frame: AudioFrame) {
        for pipeline in &self.pipelines {
            if pipeline.shared.failed.load(Ordering::SeqCst) {
                continue;
            }
            let outcome = pipeline.queue.push(frame.clone());
            if outcome.lost_frame()
                && !pipeline.shared.overrun_reported.swap(true, Ordering::SeqCst)
            {
                warn!(
                    "frame queue overrun on {}",
                    pipeline.target.path.display()
                );
                self.delegate.on_event(&SessionEvent::BackpressureOverrun {
                    path: pipeline.target.path.clone(),
                });
            }
        }
    }

    /// Fails the target writing to `path` without touching its sibling.
    /// Its worker notices the flag, discards the backlog and reaps the
    /// sink. Returns false when no target matches.
    pub fn mark_target_failed(&self, path: &Path, reason: &str) -> bool {
        let Some(pipeline) = self.find(path) else {
            return false;
        };
        pipeline.shared.record_failure(reason.to_string());
        true
    }

    /// Counts one stall episode against the target writing to `path`.
    pub fn record_stall(&self, path: &Path) -> bool {
        let Some(pipeline) = self.find(path) else {
            return false;
        };
        pipeline.shared.stall_episodes.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn healthy_targets(&self) -> usize {
        self.pipelines
            .iter()
            .filter(|p| !p.shared.failed.load(Ordering::SeqCst))
            .count()
    }

    pub fn targets(&self) -> impl Iterator<Item = &EncodeTarget> {
        self.pipelines.iter().map(|p| &p.target)
    }

    /// Stops every pipeline and waits for the workers to finish. With
    /// `drain` the queued backlog is encoded before the sinks close; without
    /// it the backlog is discarded. Outcomes come back in target order.
    pub fn stop_both(&self, drain: bool) -> Vec<TargetOutcome> {
        for pipeline in &self.pipelines {
            if drain {
                pipeline.queue.close();
            } else {
                pipeline.queue.abandon();
            }
        }

        self.pipelines
            .iter()
            .map(|pipeline| {
                let closure = match pipeline.worker.lock().take() {
                    Some(handle) => match handle.join() {
                        Ok(closure) => closure,
                        Err(_) => {
                            error!(
                                "encode worker for {} panicked",
                                pipeline.target.path.display()
                            );
                            None
                        }
                    },
                    None => None,
                };
                TargetOutcome {
                    target: pipeline.target.clone(),
                    closure,
                    failure: pipeline.shared.failure.lock().clone(),
                    frames_written: pipeline.shared.frames_written.load(Ordering::SeqCst),
                    frames_dropped: pipeline.queue.dropped(),
                    stall_episodes: pipeline.shared.stall_episodes.load(Ordering::SeqCst),
                }
            })
            .collect()
    }

    fn find(&self, path: &Path) -> Option<&TargetPipeline> {
        self.pipelines.iter().find(|p| p.target.path == path)
    }
}

enum WorkerEnd {
    Drained,
    Failed,
}

/// Per-target consumer loop. Pulls frames until the queue drains or the
/// pipeline fails, then closes the sink exactly once.
fn run_worker(
    queue: Arc<FrameQueue>,
    mut sink: Box<dyn EncodeSink>,
    shared: Arc<PipelineShared>,
    delegate: Arc<dyn SessionDelegate>,
    failure_hook: FailureHook,
) -> Option<SinkClosure> {
    let end = loop {
        if shared.failed.load(Ordering::SeqCst) {
            // Failed from outside (file corruption): the backlog is moot.
            queue.abandon();
            break WorkerEnd::Failed;
        }
        let step = match queue.pop(WORKER_POLL) {
            PopOutcome::Frame(frame) => {
                let written = sink.write(&frame.samples);
                if written.is_ok() {
                    shared.frames_written.fetch_add(1, Ordering::SeqCst);
                }
                written
            }
            // Idle between frames: push buffered bytes down so the
            // on-disk file keeps pace with what has been encoded.
            PopOutcome::Empty => sink.flush(),
            PopOutcome::Drained => break WorkerEnd::Drained,
        };
        if let Err(e) = step {
            error!("encode write failed for {}: {e}", shared.path.display());
            shared.record_failure(e.to_string());
            queue.abandon();
            delegate.on_event(&SessionEvent::EncodeWriteError {
                path: shared.path.clone(),
                detail: e.to_string(),
            });
            failure_hook();
            break WorkerEnd::Failed;
        }
    };

    match end {
        WorkerEnd::Drained => match sink.close() {
            Ok(closure) => Some(closure),
            Err(e) => {
                error!("finalize failed for {}: {e}", shared.path.display());
                shared.record_failure(e.to_string());
                delegate.on_event(&SessionEvent::EncodeWriteError {
                    path: shared.path.clone(),
                    detail: e.to_string(),
                });
                failure_hook();
                None
            }
        },
        WorkerEnd::Failed => {
            // Close for cleanup only; a failed target records no digest.
            let _ = sink.close();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Instant;

    use crate::models::frame::StreamSpec;
    use crate::processing::hashing::{Digest, HashingSink};
    use crate::processing::pcm::samples_to_bytes;
    use crate::traits::delegate::NullDelegate;
    use crate::traits::encode_sink::SinkFactory;

    #[derive(Default)]
    struct TestFactory {
        log: Arc<Mutex<Vec<String>>>,
        open_fails_for: Option<PathBuf>,
        writes_fail_for: Option<PathBuf>,
        write_delay: Option<Duration>,
    }

    struct TestSink {
        path: PathBuf,
        hash: HashingSink,
        bytes: u64,
        log: Arc<Mutex<Vec<String>>>,
        fail_writes: bool,
        write_delay: Option<Duration>,
    }

    impl SinkFactory for TestFactory {
        fn open(
            &self,
            target: &EncodeTarget,
            _spec: &StreamSpec,
        ) -> Result<Box<dyn EncodeSink>, CaptureError> {
            if self.open_fails_for.as_deref() == Some(&target.path) {
                // Leave a partial file behind, as a real sink that died
                // mid-open would.
                let _ = File::create(&target.path);
                return Err(CaptureError::Storage("disk full".into()));
            }
            File::create(&target.path)
                .map_err(|e| CaptureError::Storage(e.to_string()))?;
            self.log.lock().push(format!("open {}", target.path.display()));
            Ok(Box::new(TestSink {
                path: target.path.clone(),
                hash: HashingSink::new(),
                bytes: 0,
                log: Arc::clone(&self.log),
                fail_writes: self.writes_fail_for.as_deref() == Some(&target.path),
                write_delay: self.write_delay,
            }))
        }
    }

    impl EncodeSink for TestSink {
        fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
            if let Some(delay) = self.write_delay {
                thread::sleep(delay);
            }
            if self.fail_writes {
                return Err(CaptureError::EncodeWrite("simulated write failure".into()));
            }
            let bytes = samples_to_bytes(samples);
            self.hash.update(&bytes)?;
            self.bytes += bytes.len() as u64;
            Ok(())
        }

        fn flush(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<SinkClosure, CaptureError> {
            let mut this = *self;
            this.log.lock().push(format!("close {}", this.path.display()));
            Ok(SinkClosure {
                digest: this.hash.finalize()?,
                bytes_written: this.bytes,
            })
        }
    }

    fn test_config(factory: TestFactory) -> SessionConfig {
        SessionConfig {
            sink_factory: Arc::new(factory),
            ..SessionConfig::default()
        }
    }

    fn frame(seq: u64) -> AudioFrame {
        let samples: Vec<i16> = (0..64).map(|i| (seq as i16).wrapping_add(i)).collect();
        AudioFrame::new(seq, Duration::from_millis(seq * 10), Arc::from(samples))
    }

    fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn frames_flow_to_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let targets = vec![
            EncodeTarget::new(crate::models::target::EncodeFormat::Wav, dir.path().join("a.wav")),
            EncodeTarget::new(
                crate::models::target::EncodeFormat::Mp3 { bitrate_kbps: 128 },
                dir.path().join("a.mp3"),
            ),
        ];
        let config = test_config(TestFactory::default());
        let coordinator = DualFormatCoordinator::start_both(
            &targets,
            &config,
            Arc::new(NullDelegate),
            Arc::new(|| {}),
        )
        .unwrap();

        let mut expected = Vec::new();
        for seq in 0..10 {
            let f = frame(seq);
            expected.extend_from_slice(&samples_to_bytes(&f.samples));
            coordinator.fan_out(f);
        }
        let outcomes = coordinator.stop_both(true);

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.frames_written, 10);
            assert_eq!(outcome.frames_dropped, 0);
            let closure = outcome.closure.as_ref().unwrap();
            assert_eq!(closure.digest, Digest::of(&expected));
        }
    }

    #[test]
    fn open_failure_unwinds_earlier_targets() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("ok.wav");
        let bad = dir.path().join("full.mp3");
        let targets = vec![
            EncodeTarget::new(crate::models::target::EncodeFormat::Wav, good.clone()),
            EncodeTarget::new(
                crate::models::target::EncodeFormat::Mp3 { bitrate_kbps: 128 },
                bad.clone(),
            ),
        ];
        let log = Arc::new(Mutex::new(Vec::new()));
        let factory = TestFactory {
            log: Arc::clone(&log),
            open_fails_for: Some(bad.clone()),
            ..TestFactory::default()
        };

        let err = DualFormatCoordinator::start_both(
            &targets,
            &test_config(factory),
            Arc::new(NullDelegate),
            Arc::new(|| {}),
        )
        .err()
        .unwrap();

        assert!(matches!(err, CaptureError::InvalidTarget(_)));
        // The sibling that opened was closed again, and neither file remains.
        assert!(log.lock().iter().any(|l| l.starts_with("close")));
        assert!(!good.exists());
        assert!(!bad.exists());
    }

    #[test]
    fn failed_target_does_not_stop_its_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let healthy = dir.path().join("ok.wav");
        let doomed = dir.path().join("doomed.mp3");
        let targets = vec![
            EncodeTarget::new(crate::models::target::EncodeFormat::Wav, healthy.clone()),
            EncodeTarget::new(
                crate::models::target::EncodeFormat::Mp3 { bitrate_kbps: 128 },
                doomed.clone(),
            ),
        ];
        let factory = TestFactory {
            writes_fail_for: Some(doomed.clone()),
            ..TestFactory::default()
        };
        let coordinator = DualFormatCoordinator::start_both(
            &targets,
            &test_config(factory),
            Arc::new(NullDelegate),
            Arc::new(|| {}),
        )
        .unwrap();

        coordinator.fan_out(frame(0));
        wait_until("doomed target to fail", || coordinator.healthy_targets() == 1);

        for seq in 1..20 {
            coordinator.fan_out(frame(seq));
        }
        let outcomes = coordinator.stop_both(true);

        let ok = outcomes.iter().find(|o| o.target.path == healthy).unwrap();
        let failed = outcomes.iter().find(|o| o.target.path == doomed).unwrap();
        assert_eq!(ok.frames_written, 20);
        assert!(ok.closure.is_some());
        assert!(ok.failure.is_none());
        assert!(failed.closure.is_none());
        assert!(failed.failure.as_ref().unwrap().contains("simulated"));
    }

    #[test]
    fn mark_target_failed_reflects_in_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shrunk.wav");
        let targets = vec![EncodeTarget::new(
            crate::models::target::EncodeFormat::Wav,
            path.clone(),
        )];
        let coordinator = DualFormatCoordinator::start_both(
            &targets,
            &test_config(TestFactory::default()),
            Arc::new(NullDelegate),
            Arc::new(|| {}),
        )
        .unwrap();

        assert!(coordinator.mark_target_failed(&path, "file shrank on disk"));
        assert!(!coordinator.mark_target_failed(Path::new("/no/such"), "x"));
        wait_until("worker to notice the flag", || {
            coordinator.healthy_targets() == 0
        });

        let outcomes = coordinator.stop_both(true);
        assert!(outcomes[0].closure.is_none());
        assert_eq!(
            outcomes[0].failure.as_deref(),
            Some("file shrank on disk")
        );
    }

    #[test]
    fn abandon_discards_the_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let targets = vec![EncodeTarget::new(
            crate::models::target::EncodeFormat::Wav,
            dir.path().join("slow.wav"),
        )];
        let factory = TestFactory {
            write_delay: Some(Duration::from_millis(5)),
            ..TestFactory::default()
        };
        let mut config = test_config(factory);
        config.queue_capacity = 64;

        let coordinator = DualFormatCoordinator::start_both(
            &targets,
            &config,
            Arc::new(NullDelegate),
            Arc::new(|| {}),
        )
        .unwrap();
        for seq in 0..50 {
            coordinator.fan_out(frame(seq));
        }
        let outcomes = coordinator.stop_both(false);

        // The sink still finalizes, but the backlog was dropped rather
        // than encoded.
        assert!(outcomes[0].closure.is_some());
        assert!(outcomes[0].frames_written < 50);
    }

    #[test]
    fn stall_episodes_are_counted_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stall.wav");
        let targets = vec![EncodeTarget::new(
            crate::models::target::EncodeFormat::Wav,
            path.clone(),
        )];
        let coordinator = DualFormatCoordinator::start_both(
            &targets,
            &test_config(TestFactory::default()),
            Arc::new(NullDelegate),
            Arc::new(|| {}),
        )
        .unwrap();

        assert!(coordinator.record_stall(&path));
        assert!(coordinator.record_stall(&path));
        let outcomes = coordinator.stop_both(true);
        assert_eq!(outcomes[0].stall_episodes, 2);
    }
}
