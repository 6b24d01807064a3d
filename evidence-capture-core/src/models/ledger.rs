use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::frame::StreamSpec;
use crate::models::target::EncodeTarget;
use crate::traits::encode_sink::SinkClosure;

/// Overall outcome of a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// Every target finalized cleanly and passed the integrity checks.
    Completed,
    /// At least one target failed, or an integrity check did not hold.
    Failed,
    /// The session was deliberately discarded.
    Aborted { reason: String },
}

/// Terminal status of one encode target.
///
/// `Clean` means the sink finalized normally, so the recorded digest and
/// byte count are authoritative for the file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Clean,
    Failed { reason: String },
}

/// Data-quality warnings: losses and anomalies that do not void the
/// recording but belong in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityWarning {
    BackpressureOverrun { target: String, frames_dropped: u64 },
    Stall { target: String, episodes: u32 },
}

/// Per-target section of a sealed ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub format: String,
    pub path: String,
    pub status: TargetStatus,
    /// Hex digest of the file as written; absent if the sink never finalized.
    pub sha256: Option<String>,
    pub bytes_written: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub data_duration_secs: f64,
    pub stall_episodes: u32,
}

/// Durable summary of a finished capture session.
///
/// Sealed exactly once, after which it is immutable; serializable for the
/// JSON sidecar and the report generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLedger {
    pub session_id: String,
    pub device: String,
    pub writer_version: String,
    pub started_at: String,
    pub stopped_at: String,
    /// Session duration on the sample clock: frames captured x frame period.
    pub duration_secs: f64,
    pub frames_captured: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub status: LedgerStatus,
    pub targets: Vec<TargetRecord>,
    pub warnings: Vec<QualityWarning>,
}

/// Everything the seal needs from the session besides per-target outcomes.
#[derive(Debug, Clone)]
pub struct SealContext {
    pub session_id: Uuid,
    pub device: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub frames_captured: u64,
    pub stream: StreamSpec,
    /// Set when `abort` was invoked; takes precedence over every other rule.
    pub abort_reason: Option<String>,
}

/// What one encode pipeline reports back when the session stops.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub target: EncodeTarget,
    /// Present when the sink finalized cleanly.
    pub closure: Option<SinkClosure>,
    /// First failure observed on this target, if any.
    pub failure: Option<String>,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub stall_episodes: u32,
}

impl TargetOutcome {
    fn is_clean(&self) -> bool {
        self.failure.is_none() && self.closure.is_some()
    }

    /// Integrity check for a clean target: nonzero output, and the frames
    /// accounted for (written plus deliberately dropped) match the captured
    /// total within one frame.
    fn holds_invariant(&self, frames_captured: u64) -> bool {
        let Some(closure) = &self.closure else {
            return false;
        };
        if closure.bytes_written == 0 {
            return false;
        }
        let accounted = self.frames_written + self.frames_dropped;
        accounted.abs_diff(frames_captured) <= 1
    }
}

impl SessionLedger {
    /// Assembles the final ledger from the session context and per-target
    /// outcomes. Pure: no I/O, no clock reads.
    ///
    /// Status rules, in precedence order:
    /// 1. `aborted` when abort was invoked, whatever the targets look like;
    /// 2. `completed` when every target finalized cleanly, wrote at least
    ///    one byte, and its accounted frames match the captured total
    ///    within one frame;
    /// 3. `failed` otherwise.
    pub fn seal(ctx: SealContext, outcomes: Vec<TargetOutcome>) -> SessionLedger {
        let period = ctx.stream.frame_period();
        let mut targets = Vec::with_capacity(outcomes.len());
        let mut warnings = Vec::new();
        let mut all_clean = !outcomes.is_empty();

        for outcome in &outcomes {
            let path = outcome.target.path.display().to_string();
            if outcome.frames_dropped > 0 {
                warnings.push(QualityWarning::BackpressureOverrun {
                    target: path.clone(),
                    frames_dropped: outcome.frames_dropped,
                });
            }
            if outcome.stall_episodes > 0 {
                warnings.push(QualityWarning::Stall {
                    target: path.clone(),
                    episodes: outcome.stall_episodes,
                });
            }

            let status = match &outcome.failure {
                Some(reason) => TargetStatus::Failed {
                    reason: reason.clone(),
                },
                None if outcome.closure.is_none() => TargetStatus::Failed {
                    reason: "sink never finalized".into(),
                },
                None => TargetStatus::Clean,
            };
            all_clean &=
                outcome.is_clean() && outcome.holds_invariant(ctx.frames_captured);

            targets.push(TargetRecord {
                format: outcome.target.format.to_string(),
                path,
                status,
                sha256: outcome.closure.as_ref().map(|c| c.digest.to_hex()),
                bytes_written: outcome
                    .closure
                    .as_ref()
                    .map(|c| c.bytes_written)
                    .unwrap_or(0),
                frames_written: outcome.frames_written,
                frames_dropped: outcome.frames_dropped,
                data_duration_secs: period.mul_f64(outcome.frames_written as f64).as_secs_f64(),
                stall_episodes: outcome.stall_episodes,
            });
        }

        let status = match ctx.abort_reason {
            Some(reason) => LedgerStatus::Aborted { reason },
            None if all_clean => LedgerStatus::Completed,
            None => LedgerStatus::Failed,
        };

        SessionLedger {
            session_id: ctx.session_id.to_string(),
            device: ctx.device,
            writer_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: ctx.started_at.to_rfc3339(),
            stopped_at: ctx.stopped_at.to_rfc3339(),
            duration_secs: period.mul_f64(ctx.frames_captured as f64).as_secs_f64(),
            frames_captured: ctx.frames_captured,
            sample_rate: ctx.stream.sample_rate,
            channels: ctx.stream.channels,
            status,
            targets,
            warnings,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == LedgerStatus::Completed
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }
}

/// Renders a duration as `HH:MM:SS.mmm` for ledger summaries.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let ms = total_ms % 1000;
    let secs = (total_ms / 1000) % 60;
    let mins = (total_ms / 60_000) % 60;
    let hours = total_ms / 3_600_000;
    format!("{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::hashing::Digest;

    fn ctx(frames_captured: u64, abort_reason: Option<&str>) -> SealContext {
        SealContext {
            session_id: Uuid::new_v4(),
            device: "mic0".into(),
            started_at: Utc::now(),
            stopped_at: Utc::now(),
            frames_captured,
            stream: StreamSpec::default(),
            abort_reason: abort_reason.map(str::to_string),
        }
    }

    fn clean_outcome(path: &str, frames: u64) -> TargetOutcome {
        TargetOutcome {
            target: EncodeTarget::new(crate::models::target::EncodeFormat::Wav, path),
            closure: Some(SinkClosure {
                digest: Digest::from_bytes([0xab; 32]),
                bytes_written: frames * 4096,
            }),
            failure: None,
            frames_written: frames,
            frames_dropped: 0,
            stall_episodes: 0,
        }
    }

    #[test]
    fn all_clean_targets_seal_completed() {
        let ledger = SessionLedger::seal(
            ctx(100, None),
            vec![clean_outcome("/tmp/a.wav", 100), clean_outcome("/tmp/b.wav", 100)],
        );
        assert!(ledger.is_completed());
        assert_eq!(ledger.targets.len(), 2);
        assert!(ledger.warnings.is_empty());
        for record in &ledger.targets {
            assert_eq!(record.status, TargetStatus::Clean);
            assert_eq!(record.sha256.as_deref().map(str::len), Some(64));
        }
    }

    #[test]
    fn zero_bytes_force_failed() {
        let mut outcome = clean_outcome("/tmp/a.wav", 0);
        outcome.closure.as_mut().unwrap().bytes_written = 0;
        let ledger = SessionLedger::seal(ctx(0, None), vec![outcome]);
        assert_eq!(ledger.status, LedgerStatus::Failed);
        // The target itself still finalized cleanly.
        assert_eq!(ledger.targets[0].status, TargetStatus::Clean);
    }

    #[test]
    fn duration_shortfall_beyond_one_frame_forces_failed() {
        let ledger = SessionLedger::seal(ctx(100, None), vec![clean_outcome("/tmp/a.wav", 98)]);
        assert_eq!(ledger.status, LedgerStatus::Failed);
    }

    #[test]
    fn one_frame_shortfall_is_within_tolerance() {
        let ledger = SessionLedger::seal(ctx(100, None), vec![clean_outcome("/tmp/a.wav", 99)]);
        assert!(ledger.is_completed());
    }

    #[test]
    fn dropped_frames_count_toward_the_accounted_total() {
        let mut outcome = clean_outcome("/tmp/a.wav", 90);
        outcome.frames_dropped = 10;
        let ledger = SessionLedger::seal(ctx(100, None), vec![outcome]);
        assert!(ledger.is_completed());
        assert_eq!(
            ledger.warnings,
            vec![QualityWarning::BackpressureOverrun {
                target: "/tmp/a.wav".into(),
                frames_dropped: 10,
            }]
        );
    }

    #[test]
    fn failed_target_forces_failed_but_survivor_stays_clean() {
        let mut bad = clean_outcome("/tmp/a.mp3", 40);
        bad.failure = Some("encode write failed: broken pipe".into());
        bad.closure = None;
        let ledger =
            SessionLedger::seal(ctx(100, None), vec![clean_outcome("/tmp/a.wav", 100), bad]);
        assert_eq!(ledger.status, LedgerStatus::Failed);
        assert_eq!(ledger.targets[0].status, TargetStatus::Clean);
        assert!(matches!(ledger.targets[1].status, TargetStatus::Failed { .. }));
        assert_eq!(ledger.targets[1].sha256, None);
    }

    #[test]
    fn abort_takes_precedence_over_clean_targets() {
        let ledger = SessionLedger::seal(
            ctx(100, Some("operator cancelled")),
            vec![clean_outcome("/tmp/a.wav", 100)],
        );
        assert_eq!(
            ledger.status,
            LedgerStatus::Aborted {
                reason: "operator cancelled".into()
            }
        );
    }

    #[test]
    fn stall_episodes_surface_as_warnings() {
        let mut outcome = clean_outcome("/tmp/a.wav", 100);
        outcome.stall_episodes = 2;
        let ledger = SessionLedger::seal(ctx(100, None), vec![outcome]);
        assert!(ledger.is_completed());
        assert_eq!(
            ledger.warnings,
            vec![QualityWarning::Stall {
                target: "/tmp/a.wav".into(),
                episodes: 2,
            }]
        );
    }

    #[test]
    fn no_targets_never_seals_completed() {
        let ledger = SessionLedger::seal(ctx(0, None), vec![]);
        assert_eq!(ledger.status, LedgerStatus::Failed);
    }

    #[test]
    fn duration_runs_on_the_sample_clock() {
        let ledger = SessionLedger::seal(ctx(100, None), vec![clean_outcome("/tmp/a.wav", 100)]);
        // 100 frames x 2048 samples at 48 kHz.
        approx::assert_relative_eq!(ledger.duration_secs, 204_800.0 / 48_000.0, epsilon = 1e-9);
        approx::assert_relative_eq!(
            ledger.targets[0].data_duration_secs,
            ledger.duration_secs,
            epsilon = 1e-9
        );
    }

    #[test]
    fn format_duration_renders_hours_minutes_seconds_millis() {
        assert_eq!(format_duration(Duration::from_millis(0)), "00:00:00.000");
        assert_eq!(
            format_duration(Duration::from_millis(3_725_042)),
            "01:02:05.042"
        );
    }

    #[test]
    fn ledger_round_trips_through_json() {
        let ledger = SessionLedger::seal(
            ctx(100, Some("power loss")),
            vec![clean_outcome("/tmp/a.wav", 100)],
        );
        let json = serde_json::to_string(&ledger).unwrap();
        let back: SessionLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
    }
}
