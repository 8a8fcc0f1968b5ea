//! Restart and truncation helpers.
//!
//! WAL segments are files named by their zero-padded decimal number
//! (`00000000`, `00000001`, ...). On startup the reader resumes from the
//! first segment after the checkpoint; segments at or below the checkpoint
//! are safe to delete.

use crate::error::MarkerResult;
use crate::handler::MarkerHandler;
use crate::store::MarkerStore;
use std::fs;
use std::path::Path;

/// Source of a saved checkpoint for a WAL reader.
pub trait Marker {
    /// Returns the last checkpointed segment, or `None` if there is no mark.
    ///
    /// A reader should start at the first segment greater than this value.
    fn last_marked_segment(&self) -> Option<u64>;
}

impl Marker for MarkerStore {
    fn last_marked_segment(&self) -> Option<u64> {
        MarkerStore::last_marked_segment(self)
    }
}

impl Marker for MarkerHandler {
    fn last_marked_segment(&self) -> Option<u64> {
        MarkerHandler::last_marked_segment(self)
    }
}

/// Lists the segment numbers present in a WAL directory, ascending.
///
/// Entries whose names are not purely decimal (checkpoint directories,
/// the marker directory, temp files) are skipped.
pub fn list_segments(wal_dir: &Path) -> MarkerResult<Vec<u64>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(wal_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(segment) = name.parse::<u64>() {
            segments.push(segment);
        }
    }
    segments.sort_unstable();
    Ok(segments)
}

/// Returns the first segment a reader should open.
///
/// That is the lowest segment above `marked`, or the lowest segment at all
/// when nothing is marked. `segments` must be sorted ascending.
#[must_use]
pub fn next_segment_after(segments: &[u64], marked: Option<u64>) -> Option<u64> {
    match marked {
        None => segments.first().copied(),
        Some(m) => segments.iter().copied().find(|&s| s > m),
    }
}

/// Returns the segments fully covered by the checkpoint.
#[must_use]
pub fn truncatable_segments(segments: &[u64], marked: Option<u64>) -> Vec<u64> {
    match marked {
        None => Vec::new(),
        Some(m) => segments.iter().copied().filter(|&s| s <= m).collect(),
    }
}
