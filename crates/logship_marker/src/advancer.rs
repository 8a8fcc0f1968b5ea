//! Checkpoint advancement.
//!
//! Walks tracked segments in ascending order and finds the highest segment
//! that can be checkpointed without leaving a hole behind it. A segment is
//! resolved when all of its data was acknowledged, or when it has made no
//! progress for longer than the TTL. Resolved segments that were walked are
//! removed from the map, which is how the tracker forgets old segments.

use crate::tracker::CountDataItem;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Result of one advancement walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Highest segment that may be checkpointed, if any.
    pub markable: Option<u64>,
    /// Segments removed from the map.
    pub resolved: usize,
    /// How many of the removed segments still had outstanding data.
    pub forced: usize,
}

/// Finds the highest markable segment as of now.
///
/// Removes every resolved segment it walks over from `data`.
pub fn find_markable_segment(
    data: &mut BTreeMap<u64, CountDataItem>,
    ttl: Duration,
) -> Option<u64> {
    find_markable_segment_at(data, ttl, Instant::now()).markable
}

/// Finds the highest markable segment as of `now`.
///
/// The walk stops at the first unresolved segment, so no segment above an
/// unresolved one is ever returned. Entries above the stop point are left
/// untouched.
pub fn find_markable_segment_at(
    data: &mut BTreeMap<u64, CountDataItem>,
    ttl: Duration,
    now: Instant,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut walked = Vec::new();

    for (&segment, item) in data.iter() {
        let stale = now.saturating_duration_since(item.last_update) > ttl;
        if item.count != 0 && !stale {
            break;
        }
        if item.count != 0 {
            resolution.forced += 1;
        }
        walked.push(segment);
        resolution.markable = Some(segment);
    }

    for segment in &walked {
        data.remove(segment);
    }
    resolution.resolved = walked.len();
    resolution
}
