//! Per-segment delivery bookkeeping.

use crate::advancer::{self, Resolution};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Outstanding data for one WAL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountDataItem {
    /// Entries read from the segment minus entries acknowledged.
    pub count: i64,
    /// Last time either side reported progress on the segment.
    pub last_update: Instant,
}

/// Tracks how much data from each segment is still in flight.
///
/// All operations take one mutex. They are map lookups with a bounded hold
/// time and never touch the disk.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    data: BTreeMap<u64, CountDataItem>,
    /// Segments at or below this are checkpointed and no longer tracked.
    floor: Option<u64>,
}

impl DeliveryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `n` entries read from `segment`.
    ///
    /// Returns false, leaving the tracker untouched, if `segment` is at or
    /// below the discard floor.
    pub fn update_received_data(&self, segment: u64, n: i64) -> bool {
        self.apply(segment, n)
    }

    /// Records `n` entries from `segment` acknowledged downstream.
    ///
    /// Creates the entry if the matching receive has not been seen yet.
    /// Returns false if `segment` is at or below the discard floor.
    pub fn update_sent_data(&self, segment: u64, n: i64) -> bool {
        self.apply(segment, n.saturating_neg())
    }

    fn apply(&self, segment: u64, delta: i64) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        if state.floor.is_some_and(|floor| segment <= floor) {
            return false;
        }
        let item = state.data.entry(segment).or_insert(CountDataItem {
            count: 0,
            last_update: now,
        });
        item.count = item.count.saturating_add(delta);
        item.last_update = now;
        true
    }

    /// Runs the advancer over the tracked segments.
    ///
    /// Resolved segments are forgotten.
    pub fn find_markable_segment(&self, ttl: Duration) -> Resolution {
        self.find_markable_segment_at(ttl, Instant::now())
    }

    pub(crate) fn find_markable_segment_at(&self, ttl: Duration, now: Instant) -> Resolution {
        let mut state = self.state.lock();
        advancer::find_markable_segment_at(&mut state.data, ttl, now)
    }

    /// Forgets every segment at or below `segment` and rejects later
    /// updates for them.
    ///
    /// The floor only moves up. Returns the number of entries removed.
    pub fn discard_through(&self, segment: u64) -> usize {
        let mut state = self.state.lock();
        let floor = state.floor.map_or(segment, |f| f.max(segment));
        state.floor = Some(floor);
        let before = state.data.len();
        state.data.retain(|&s, _| s > floor);
        before - state.data.len()
    }

    /// Returns a copy of the tracked segments in ascending order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(u64, CountDataItem)> {
        self.state
            .lock()
            .data
            .iter()
            .map(|(&s, &item)| (s, item))
            .collect()
    }

    /// Returns the number of tracked segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Returns true if no segment is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }
}
