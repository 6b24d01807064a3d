//! WAV container utilities for the built-in PCM16 writer.
//!
//! Output files are written append-only, so the header uses the streaming
//! convention: both RIFF size fields carry `0xFFFFFFFF` and readers treat
//! the data chunk as running to end of file. Nothing is patched after
//! writing; exact byte counts live in the session ledger.

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Marker written into the RIFF and data size fields of a streamed file.
pub const STREAMING_SIZE: u32 = 0xFFFF_FFFF;

/// Generate a 44-byte streaming WAV RIFF header for PCM16 audio.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    0xFFFFFFFF (streaming marker)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * 2
/// [32-33]  block_align = channels * 2
/// [34-35]  16 (bit depth)
/// [36-39]  "data"
/// [40-43]  0xFFFFFFFF (streaming marker)
/// ```
pub fn streaming_wav_header(sample_rate: u32, channels: u16) -> [u8; WAV_HEADER_SIZE] {
    const BIT_DEPTH: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * BIT_DEPTH as u32 / 8;
    let block_align = channels * BIT_DEPTH / 8;

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&STREAMING_SIZE.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // PCM format size
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM format code
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BIT_DEPTH.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&STREAMING_SIZE.to_le_bytes());

    header
}
