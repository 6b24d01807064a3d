use std::path::PathBuf;

use crate::models::ledger::SessionLedger;
use crate::models::state::SessionState;

/// Anomalies observed while a session is live, keyed by the affected
/// target's output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An output file stopped growing while capture was active. Advisory;
    /// the target keeps recording.
    StallDetected { path: PathBuf },
    /// An output file shrank or disappeared. The owning session fails the
    /// affected target.
    CorruptionDetected { path: PathBuf, detail: String },
    /// A sink rejected a write; the affected target is failed.
    EncodeWriteError { path: PathBuf, detail: String },
    /// A full frame queue caused loss. Raised once per target; the total
    /// is in the sealed ledger.
    BackpressureOverrun { path: PathBuf },
}

/// Event delegate for session notifications.
///
/// Methods are called from capture and worker threads, never the caller's
/// thread; implementations should hand off to their own executor and must
/// not block.
pub trait SessionDelegate: Send + Sync {
    /// Called on every state transition.
    fn on_state_changed(&self, state: SessionState) {
        let _ = state;
    }

    /// Called for anomalies observed while recording.
    fn on_event(&self, event: &SessionEvent) {
        let _ = event;
    }

    /// Called exactly once, when the ledger is sealed.
    fn on_sealed(&self, ledger: &SessionLedger) {
        let _ = ledger;
    }
}

/// Delegate that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDelegate;

impl SessionDelegate for NullDelegate {}
