use thiserror::Error;

/// Errors that can occur across the recording pipeline.
///
/// `DeviceUnavailable` and `InvalidTarget` reject `start` synchronously; no
/// session exists afterwards. Everything that happens once a session is
/// running is captured into session state and reflected in the sealed
/// ledger rather than surfaced on the capture path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("invalid encode target: {0}")]
    InvalidTarget(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("encode write failed: {0}")]
    EncodeWrite(String),

    /// Contract violation: a hashing sink was used after `finalize`.
    #[error("sink already finalized")]
    ClosedSink,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),
}
