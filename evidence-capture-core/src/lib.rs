//! # evidence-capture-core
//!
//! Core library for integrity-preserving voice capture.
//!
//! Provides hashed append-only storage, dual-format encode fan-out, file
//! growth supervision, and session orchestration that seals every recording
//! into a verifiable [`SessionLedger`]. Input backends implement the
//! `InputDevice` trait and plug into the generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! evidence-capture-core (this crate)
//! ├── traits/       ← InputDevice, EncodeSink, SinkFactory, SessionDelegate
//! ├── models/       ← CaptureError, SessionState, SessionConfig, SessionLedger, etc.
//! ├── processing/   ← HashingSink, FrameQueue, WAV header generation, PCM helpers
//! ├── encode/       ← WavEncoder, CommandEncoder (external encoder delegation)
//! ├── session/      ← CaptureSession, DualFormatCoordinator, FileGrowthMonitor
//! ├── storage/      ← HashedFileWriter, ledger sidecar, offline verification
//! └── device/       ← SyntheticDevice (deterministic test input)
//! ```

pub mod device;
pub mod encode;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use device::synthetic::SyntheticDevice;
pub use encode::command::CommandEncoder;
pub use encode::wav::WavEncoder;
pub use encode::DefaultSinkFactory;
pub use models::config::{MonitorConfig, OverrunPolicy, SessionConfig};
pub use models::error::CaptureError;
pub use models::frame::{AudioFrame, StreamSpec};
pub use models::ledger::{LedgerStatus, QualityWarning, SessionLedger, TargetRecord, TargetStatus};
pub use models::state::SessionState;
pub use models::target::{EncodeFormat, EncodeTarget};
pub use processing::frame_queue::FrameQueue;
pub use processing::hashing::{Digest, HashingSink};
pub use session::capture::CaptureSession;
pub use session::coordinator::DualFormatCoordinator;
pub use session::monitor::FileGrowthMonitor;
pub use storage::hashed_writer::HashedFileWriter;
pub use storage::verify::{verify_ledger, Verdict, VerifyReport};
pub use traits::delegate::{SessionDelegate, SessionEvent};
pub use traits::encode_sink::{EncodeSink, SinkClosure, SinkFactory};
pub use traits::input_device::{DeviceInfo, FrameCallback, InputDevice};
