use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::ledger::SessionLedger;

/// Location of the ledger sidecar for a recording: the recording path with
/// its extension replaced by `ledger.json`.
pub fn sidecar_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("ledger.json")
}

/// Write a sealed ledger as a JSON sidecar next to the primary recording.
pub fn write_ledger(ledger: &SessionLedger, recording_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = sidecar_path(recording_path);
    let json = serde_json::to_string_pretty(ledger)
        .map_err(|e| CaptureError::Storage(format!("failed to serialize ledger: {}", e)))?;
    fs::write(&path, json)
        .map_err(|e| CaptureError::Storage(format!("failed to write ledger sidecar: {}", e)))?;
    Ok(path)
}

/// Read a ledger back from its JSON sidecar.
pub fn read_ledger(sidecar: &Path) -> Result<SessionLedger, CaptureError> {
    let json = fs::read_to_string(sidecar)
        .map_err(|e| CaptureError::Storage(format!("failed to read ledger sidecar: {}", e)))?;
    let ledger: SessionLedger = serde_json::from_str(&json)
        .map_err(|e| CaptureError::Storage(format!("failed to parse ledger sidecar: {}", e)))?;
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_sits_next_to_the_recording() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/out/rec_20250314-092653.wav")),
            PathBuf::from("/tmp/out/rec_20250314-092653.ledger.json")
        );
    }
}
