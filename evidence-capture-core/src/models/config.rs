use std::sync::Arc;
use std::time::Duration;

use crate::models::frame::StreamSpec;
use crate::traits::encode_sink::SinkFactory;

/// What a bounded frame queue does with an arriving frame when it is full.
///
/// Either way the capture callback never blocks; the loss is counted and
/// reported in the sealed ledger as a data-quality warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Evict the oldest queued frame to make room (default).
    #[default]
    DropOldest,
    /// Refuse the incoming frame and leave the queue untouched.
    RejectNewest,
}

/// File-growth supervision cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sampling interval of the monitor thread (default: 200 ms).
    pub poll_interval: Duration,
    /// Consecutive unchanged polls before a stall is flagged.
    pub stall_polls: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            stall_polls: 10,
        }
    }
}

/// Configuration for a capture session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Capture stream geometry shared by every target.
    pub stream: StreamSpec,

    /// Per-target frame queue capacity (default: 32 frames).
    pub queue_capacity: usize,

    /// Queue-full behavior (default: drop oldest).
    pub overrun_policy: OverrunPolicy,

    /// Growth-monitor cadence and stall threshold.
    pub monitor: MonitorConfig,

    /// Write the JSON ledger sidecar next to the primary target at seal
    /// (default: true).
    pub write_sidecar: bool,

    /// Builds one encode sink per target at session start.
    pub sink_factory: Arc<dyn SinkFactory>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        if self.queue_capacity == 0 {
            return Err("queue capacity must be positive".into());
        }
        if self.monitor.poll_interval.is_zero() {
            return Err("monitor poll interval must be positive".into());
        }
        if self.monitor.stall_polls == 0 {
            return Err("stall threshold must be positive".into());
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream: StreamSpec::default(),
            queue_capacity: 32,
            overrun_policy: OverrunPolicy::default(),
            monitor: MonitorConfig::default(),
            write_sidecar: true,
            sink_factory: Arc::new(crate::encode::DefaultSinkFactory::new()),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("stream", &self.stream)
            .field("queue_capacity", &self.queue_capacity)
            .field("overrun_policy", &self.overrun_policy)
            .field("monitor", &self.monitor)
            .field("write_sidecar", &self.write_sidecar)
            .finish_non_exhaustive()
    }
}
