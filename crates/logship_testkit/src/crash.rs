//! Crash recovery testing for the marker store.
//!
//! A crash can leave the marker directory in a handful of states: an intact
//! marker, a torn or bit-flipped marker, or a stray temporary file from an
//! interrupted rename. These helpers produce each state on disk and check
//! that reopening behaves as documented.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use logship_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! let results = harness.run_all();
//! assert!(results.iter().all(|r| r.passed));
//! ```

use crate::fixtures::{fast_config, TestMarkerDir};
use logship_marker::{codec, CorruptionPolicy, MarkerError, MarkerStore};
use std::fs;

/// Ways a marker file can be damaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerCorruption {
    /// File exists but is empty.
    Empty,
    /// Only the first `n` bytes reached the disk.
    Truncated(usize),
    /// One byte was XORed with `mask`.
    FlipByte {
        /// Byte index within the record.
        index: usize,
        /// Bits to flip.
        mask: u8,
    },
    /// A well-formed record from an unknown format version.
    ForeignHeader,
    /// Extra bytes after a valid record.
    TrailingBytes(usize),
}

impl MarkerCorruption {
    /// Applies the corruption to a valid record for `segment`.
    pub fn apply(self, segment: u64) -> Vec<u8> {
        let record = codec::encode(segment);
        match self {
            Self::Empty => Vec::new(),
            Self::Truncated(n) => record[..n.min(record.len())].to_vec(),
            Self::FlipByte { index, mask } => {
                let mut bytes = record.to_vec();
                bytes[index % record.len()] ^= mask;
                bytes
            }
            Self::ForeignHeader => {
                let mut bytes = record.to_vec();
                bytes[0..2].copy_from_slice(b"v9");
                let crc = crc32fast::hash(&bytes[..10]);
                bytes[10..].copy_from_slice(&crc.to_be_bytes());
                bytes
            }
            Self::TrailingBytes(n) => {
                let mut bytes = record.to_vec();
                bytes.extend(std::iter::repeat(0u8).take(n));
                bytes
            }
        }
    }

    /// Returns true if `err` is the error this corruption should produce.
    pub fn matches(self, err: &MarkerError) -> bool {
        match self {
            Self::Empty | Self::Truncated(_) | Self::TrailingBytes(_) => {
                matches!(err, MarkerError::BadLength { .. })
            }
            Self::FlipByte { .. } => matches!(
                err,
                MarkerError::ChecksumMismatch { .. } | MarkerError::BadHeader { .. }
            ),
            Self::ForeignHeader => matches!(err, MarkerError::BadHeader { .. }),
        }
    }

    /// Representative corruptions for table-driven tests.
    pub fn all() -> Vec<Self> {
        vec![
            Self::Empty,
            Self::Truncated(1),
            Self::Truncated(10),
            Self::Truncated(13),
            Self::FlipByte { index: 0, mask: 0x01 },
            Self::FlipByte { index: 5, mask: 0x80 },
            Self::FlipByte { index: 13, mask: 0xFF },
            Self::ForeignHeader,
            Self::TrailingBytes(1),
        ]
    }
}

/// Result of a crash recovery check.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the check passed.
    pub passed: bool,
    /// Description of what was checked.
    pub description: String,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, error: impl Into<String>) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            error: Some(error.into()),
        }
    }
}

/// Test harness for marker crash recovery scenarios.
pub struct CrashRecoveryHarness {
    /// Results of the checks run so far.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new harness.
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
        }
    }

    /// A persisted checkpoint survives close and reopen.
    pub fn test_mark_survives_reopen(&mut self) -> CrashRecoveryResult {
        let description = "Persisted checkpoint survives reopen";
        let dir = TestMarkerDir::new();
        let result = (|| -> Result<Option<u64>, MarkerError> {
            {
                let store = MarkerStore::open(dir.path())?;
                store.mark_segment(41)?;
                store.mark_segment(42)?;
            }
            Ok(MarkerStore::open(dir.path())?.last_marked_segment())
        })();

        let outcome = match result {
            Ok(Some(42)) => CrashRecoveryResult::pass(description),
            Ok(other) => CrashRecoveryResult::fail(description, format!("reopened at {other:?}")),
            Err(e) => CrashRecoveryResult::fail(description, e.to_string()),
        };
        self.results.push(outcome.clone());
        outcome
    }

    /// A damaged marker refuses to open under the default policy.
    pub fn test_corruption_is_fatal(&mut self, corruption: MarkerCorruption) -> CrashRecoveryResult {
        let description = format!("{corruption:?} marker is rejected");
        let dir = TestMarkerDir::new();
        dir.write_raw_marker(&corruption.apply(7));

        let outcome = match MarkerStore::open(dir.path()) {
            Err(e) if corruption.matches(&e) => CrashRecoveryResult::pass(&description),
            Err(e) => CrashRecoveryResult::fail(&description, format!("wrong error: {e}")),
            Ok(store) => CrashRecoveryResult::fail(
                &description,
                format!("opened at {:?}", store.last_marked_segment()),
            ),
        };
        self.results.push(outcome.clone());
        outcome
    }

    /// A damaged marker is discarded under the reset policy.
    pub fn test_corruption_reset(&mut self, corruption: MarkerCorruption) -> CrashRecoveryResult {
        let description = format!("{corruption:?} marker is reset");
        let dir = TestMarkerDir::new();
        dir.write_raw_marker(&corruption.apply(7));

        let config = fast_config().corruption_policy(CorruptionPolicy::Reset);
        let outcome = match MarkerStore::open_with_config(dir.path(), &config) {
            Ok(store) if store.last_marked_segment().is_none() => {
                CrashRecoveryResult::pass(&description)
            }
            Ok(store) => CrashRecoveryResult::fail(
                &description,
                format!("opened at {:?}", store.last_marked_segment()),
            ),
            Err(e) => CrashRecoveryResult::fail(&description, e.to_string()),
        };
        self.results.push(outcome.clone());
        outcome
    }

    /// A temp file left by a crash before rename does not affect the marker.
    pub fn test_interrupted_rename(&mut self) -> CrashRecoveryResult {
        let description = "Leftover temp file is ignored and replaced";
        let dir = TestMarkerDir::new();
        dir.write_marker(5);
        let temp_path = dir.marker_path().with_file_name("segment_marker.tmp");

        let result = (|| -> Result<(Option<u64>, Option<u64>), MarkerError> {
            fs::write(&temp_path, &codec::encode(6)[..4])?;
            let store = MarkerStore::open(dir.path())?;
            let before = store.last_marked_segment();
            store.mark_segment(6)?;
            Ok((before, store.last_marked_segment()))
        })();

        let outcome = match result {
            Ok((Some(5), Some(6))) if !temp_path.exists() && dir.read_marker() == Some(6) => {
                CrashRecoveryResult::pass(description)
            }
            Ok(values) => CrashRecoveryResult::fail(description, format!("got {values:?}")),
            Err(e) => CrashRecoveryResult::fail(description, e.to_string()),
        };
        self.results.push(outcome.clone());
        outcome
    }

    /// Runs every check.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        self.test_mark_survives_reopen();
        self.test_interrupted_rename();
        for corruption in MarkerCorruption::all() {
            self.test_corruption_is_fatal(corruption);
            self.test_corruption_reset(corruption);
        }
        self.results.clone()
    }

    /// Returns true if every recorded check passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

impl Default for CrashRecoveryHarness {
    fn default() -> Self {
        Self::new()
    }
}
