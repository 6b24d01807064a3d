/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → recording → stopping → finalized
///             ↓          ↓
///             └──────→ aborted
/// ```
///
/// `Finalized` and `Aborted` are terminal; sessions are single-use and are
/// archived into a [`SessionLedger`](crate::models::ledger::SessionLedger)
/// when they reach either one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Finalized,
    Aborted,
}

impl SessionState {
    /// Frames are accepted only while recording.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Recording or draining toward a seal.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
