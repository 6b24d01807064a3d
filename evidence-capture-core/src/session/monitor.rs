use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::models::config::MonitorConfig;

/// One observation of a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSample {
    pub at: Instant,
    /// Observed size; `None` when the file is missing.
    pub size: Option<u64>,
}

/// Anomalies raised by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The file stopped growing while its session was live. Latched: one
    /// per stall episode, re-armed when growth resumes.
    Stall { path: PathBuf, sample: MonitorSample },
    /// The file shrank or disappeared. The watch is dropped; the owning
    /// session fails the affected target.
    Corruption { path: PathBuf, detail: String },
}

/// Callback receiving monitor events, invoked on the monitor thread (or on
/// the caller of a manual `poll`).
pub type MonitorObserver = Arc<dyn Fn(&MonitorEvent) + Send + Sync + 'static>;

/// Identifies one attached watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

struct Watch {
    id: WatchId,
    path: PathBuf,
    /// Consecutive unchanged polls tolerated before a stall is flagged.
    stall_threshold: u32,
    last: Option<MonitorSample>,
    unchanged_polls: u32,
    stalled: bool,
}

struct MonitorShared {
    config: MonitorConfig,
    watches: Mutex<Vec<Watch>>,
    next_id: Mutex<u64>,
    observer: MonitorObserver,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl MonitorShared {
    /// One sampling pass over every watch. Events are emitted after the
    /// watch lock is released.
    fn poll_all(&self) {
        let mut events = Vec::new();
        {
            let mut watches = self.watches.lock();
            let mut i = 0;
            while i < watches.len() {
                match Self::poll_watch(&mut watches[i]) {
                    Some(event @ MonitorEvent::Corruption { .. }) => {
                        // A corrupt file stays corrupt; drop the watch so the
                        // episode is reported exactly once.
                        events.push(event);
                        watches.swap_remove(i);
                    }
                    Some(event) => {
                        events.push(event);
                        i += 1;
                    }
                    None => i += 1,
                }
            }
        }
        for event in &events {
            (self.observer)(event);
        }
    }

    fn poll_one(&self, id: WatchId) -> Option<MonitorSample> {
        let (sample, event) = {
            let mut watches = self.watches.lock();
            let index = watches.iter().position(|w| w.id == id)?;
            let event = Self::poll_watch(&mut watches[index]);
            let sample = watches[index].last;
            if matches!(event, Some(MonitorEvent::Corruption { .. })) {
                watches.swap_remove(index);
            }
            (sample, event)
        };
        if let Some(event) = event {
            (self.observer)(&event);
        }
        sample
    }

    /// Samples one watch and updates its stall/corruption state.
    fn poll_watch(watch: &mut Watch) -> Option<MonitorEvent> {
        let sample = MonitorSample {
            at: Instant::now(),
            size: fs::metadata(&watch.path).ok().map(|m| m.len()),
        };
        let previous = watch.last.replace(sample);

        let Some(size) = sample.size else {
            warn!("watched file disappeared: {}", watch.path.display());
            return Some(MonitorEvent::Corruption {
                path: watch.path.clone(),
                detail: "file disappeared while recording".into(),
            });
        };
        let Some(prev_size) = previous.and_then(|p| p.size) else {
            // First observation is the baseline.
            return None;
        };

        if size < prev_size {
            warn!(
                "watched file shrank from {} to {} bytes: {}",
                prev_size,
                size,
                watch.path.display()
            );
            return Some(MonitorEvent::Corruption {
                path: watch.path.clone(),
                detail: format!("file shrank from {} to {} bytes", prev_size, size),
            });
        }
        if size > prev_size {
            watch.unchanged_polls = 0;
            watch.stalled = false;
            return None;
        }

        watch.unchanged_polls += 1;
        if !watch.stalled && watch.unchanged_polls > watch.stall_threshold {
            watch.stalled = true;
            debug!(
                "no growth for {} polls: {}",
                watch.unchanged_polls,
                watch.path.display()
            );
            return Some(MonitorEvent::Stall {
                path: watch.path.clone(),
                sample,
            });
        }
        None
    }
}

/// Supervises output files while a session records.
///
/// Samples every attached file's size on a fixed cadence. Unchanged size
/// past the stall threshold raises one `Stall` per episode; a shrinking or
/// missing file raises `Corruption`. Watches must be detached (or the
/// monitor dropped) at stop, before sinks are finalized, so a legitimate
/// stop never reports a stall.
pub struct FileGrowthMonitor {
    shared: Arc<MonitorShared>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FileGrowthMonitor {
    /// Creates the monitor and starts its sampling thread.
    pub fn new(config: MonitorConfig, observer: MonitorObserver) -> Self {
        let shared = Arc::new(MonitorShared {
            config,
            watches: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            observer,
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("growth-monitor".into())
            .spawn(move || loop {
                {
                    let mut stop = thread_shared.shutdown.lock();
                    if *stop {
                        break;
                    }
                    thread_shared
                        .wake
                        .wait_for(&mut stop, thread_shared.config.poll_interval);
                    if *stop {
                        break;
                    }
                }
                thread_shared.poll_all();
            })
            .expect("failed to spawn monitor thread");

        Self {
            shared,
            thread: Some(handle),
        }
    }

    /// Start watching `path`. `expected_interval` is how often the file is
    /// expected to grow; the stall threshold widens for files that grow
    /// slower than the polling cadence.
    pub fn attach(&self, path: PathBuf, expected_interval: Duration) -> WatchId {
        let id = {
            let mut next = self.shared.next_id.lock();
            *next += 1;
            WatchId(*next)
        };
        let needed =
            expected_interval.as_secs_f64() / self.shared.config.poll_interval.as_secs_f64();
        let stall_threshold = self.shared.config.stall_polls.max(needed.ceil() as u32);

        self.shared.watches.lock().push(Watch {
            id,
            path,
            stall_threshold,
            last: None,
            unchanged_polls: 0,
            stalled: false,
        });
        id
    }

    /// One sampling pass over every watch, exactly what the cadence thread
    /// runs each tick.
    pub fn poll_now(&self) {
        self.shared.poll_all();
    }

    /// One manual sampling pass over a single watch; events fire as from
    /// the monitor thread. Returns the fresh sample, or `None` if the
    /// watch is gone.
    pub fn poll(&self, id: WatchId) -> Option<MonitorSample> {
        self.shared.poll_one(id)
    }

    /// Stop watching `id`. Safe on an already-removed watch.
    pub fn detach(&self, id: WatchId) {
        self.shared.watches.lock().retain(|w| w.id != id);
    }

    pub fn watch_count(&self) -> usize {
        self.shared.watches.lock().len()
    }
}

impl Drop for FileGrowthMonitor {
    fn drop(&mut self) {
        {
            let mut stop = self.shared.shutdown.lock();
            *stop = true;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
