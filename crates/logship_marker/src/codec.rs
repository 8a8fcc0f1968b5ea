//! Marker record encoding.
//!
//! A marker record is a fixed 14-byte, big-endian layout:
//!
//! ```text
//! ┌─────────┬──────────────────┬──────────┐
//! │ "v1" 2B │ segment (u64) 8B │ CRC32 4B │
//! └─────────┴──────────────────┴──────────┘
//! ```
//!
//! The CRC-32 (IEEE) covers the header and the segment number.

use crate::error::{MarkerError, MarkerResult};

/// Version header identifying the v1 record layout.
pub const MARKER_HEADER_V1: [u8; 2] = *b"v1";

/// Size of an encoded marker record.
pub const MARKER_RECORD_SIZE: usize = 14;

/// Offset of the checksum within a record.
const CRC_OFFSET: usize = 10;

/// Encodes a segment number as a marker record.
#[must_use]
pub fn encode(segment: u64) -> [u8; MARKER_RECORD_SIZE] {
    let mut buf = [0u8; MARKER_RECORD_SIZE];
    buf[0..2].copy_from_slice(&MARKER_HEADER_V1);
    buf[2..CRC_OFFSET].copy_from_slice(&segment.to_be_bytes());
    let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
    buf[CRC_OFFSET..].copy_from_slice(&crc.to_be_bytes());
    buf
}

/// Decodes a marker record into the segment number it holds.
///
/// Length is checked first, then the checksum, then the header, so a torn
/// or bit-flipped record is reported as such before its header is trusted.
///
/// # Errors
///
/// Returns [`MarkerError::BadLength`], [`MarkerError::ChecksumMismatch`] or
/// [`MarkerError::BadHeader`].
pub fn decode(data: &[u8]) -> MarkerResult<u64> {
    if data.len() != MARKER_RECORD_SIZE {
        return Err(MarkerError::BadLength {
            expected: MARKER_RECORD_SIZE,
            actual: data.len(),
        });
    }

    let stored = u32::from_be_bytes([
        data[CRC_OFFSET],
        data[CRC_OFFSET + 1],
        data[CRC_OFFSET + 2],
        data[CRC_OFFSET + 3],
    ]);
    let computed = crc32fast::hash(&data[..CRC_OFFSET]);
    if stored != computed {
        return Err(MarkerError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    let header = [data[0], data[1]];
    if header != MARKER_HEADER_V1 {
        return Err(MarkerError::BadHeader { found: header });
    }

    let mut segment = [0u8; 8];
    segment.copy_from_slice(&data[2..CRC_OFFSET]);
    Ok(u64::from_be_bytes(segment))
}
