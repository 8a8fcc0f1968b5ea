//! Error types for the segment marker.

use std::io;
use thiserror::Error;

/// Result type for marker operations.
pub type MarkerResult<T> = Result<T, MarkerError>;

/// Errors that can occur while reading, writing or tracking checkpoints.
#[derive(Debug, Error)]
pub enum MarkerError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Marker record is not exactly the expected size.
    #[error("bad marker length: expected {expected} bytes, got {actual}")]
    BadLength {
        /// Expected record size.
        expected: usize,
        /// Actual record size.
        actual: usize,
    },

    /// Stored checksum does not match the record contents.
    #[error("marker checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// Version header is not one this build understands.
    #[error("bad marker header: {found:02x?}")]
    BadHeader {
        /// The header bytes found in the record.
        found: [u8; 2],
    },

    /// Another marker store already owns the marker directory.
    #[error("marker directory locked: another writer has exclusive access")]
    MarkerLocked,

    /// Configuration value is out of range.
    #[error("invalid marker configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A path that must be a directory is something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },
}

impl MarkerError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if the error describes an unreadable marker record
    /// rather than an environmental failure.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::BadLength { .. } | Self::ChecksumMismatch { .. } | Self::BadHeader { .. }
        )
    }
}
