//! Marker statistics.
//!
//! A [`MarkerStats`] instance is created by whoever owns the shipping
//! pipeline and handed to the [`MarkerHandler`](crate::MarkerHandler), so
//! several handlers in one process never share counters by accident.
//!
//! ```rust
//! use logship_marker::MarkerStats;
//! use std::sync::Arc;
//!
//! let stats = Arc::new(MarkerStats::new());
//! // handler = MarkerHandler::with_stats(store, config, Arc::clone(&stats))?;
//! assert_eq!(stats.snapshot().last_marked_segment, None);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Checkpoint counters for one handler.
///
/// Counters are monotonically increasing; `last_marked_segment` is a gauge.
#[derive(Debug)]
pub struct MarkerStats {
    /// Last persisted checkpoint, -1 when none.
    last_marked_segment: AtomicI64,
    /// Successful marker writes.
    marks_written: AtomicU64,
    /// Failed marker writes.
    mark_failures: AtomicU64,
    /// Segments resolved because they aged past the TTL.
    forced_resolutions: AtomicU64,
    /// Updates dropped because their segment was already checkpointed.
    ignored_updates: AtomicU64,
    /// Advancement passes run.
    passes: AtomicU64,
    /// Entries reported as read from the WAL.
    received: AtomicU64,
    /// Entries reported as delivered.
    sent: AtomicU64,
}

impl Default for MarkerStats {
    fn default() -> Self {
        Self {
            last_marked_segment: AtomicI64::new(-1),
            marks_written: AtomicU64::new(0),
            mark_failures: AtomicU64::new(0),
            forced_resolutions: AtomicU64::new(0),
            ignored_updates: AtomicU64::new(0),
            passes: AtomicU64::new(0),
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        }
    }
}

impl MarkerStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_last_marked_segment(&self, segment: Option<u64>) {
        let value = segment.map_or(-1, |s| i64::try_from(s).unwrap_or(i64::MAX));
        self.last_marked_segment.store(value, Ordering::Relaxed);
    }

    pub(crate) fn record_mark(&self) {
        self.marks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mark_failure(&self) {
        self.mark_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forced(&self, count: u64) {
        self.forced_resolutions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored_update(&self) {
        self.ignored_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns the last persisted checkpoint.
    pub fn last_marked_segment(&self) -> Option<u64> {
        u64::try_from(self.last_marked_segment.load(Ordering::Relaxed)).ok()
    }

    /// Returns the number of successful marker writes.
    pub fn marks_written(&self) -> u64 {
        self.marks_written.load(Ordering::Relaxed)
    }

    /// Returns the number of failed marker writes.
    pub fn mark_failures(&self) -> u64 {
        self.mark_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of segments force-resolved by age.
    ///
    /// A non-zero value means some data may never have been acknowledged.
    pub fn forced_resolutions(&self) -> u64 {
        self.forced_resolutions.load(Ordering::Relaxed)
    }

    /// Returns the number of updates dropped for checkpointed segments.
    pub fn ignored_updates(&self) -> u64 {
        self.ignored_updates.load(Ordering::Relaxed)
    }

    /// Returns the number of advancement passes.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Returns the total entries reported as received.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Returns the total entries reported as sent.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> MarkerStatsSnapshot {
        MarkerStatsSnapshot {
            last_marked_segment: self.last_marked_segment(),
            marks_written: self.marks_written(),
            mark_failures: self.mark_failures(),
            forced_resolutions: self.forced_resolutions(),
            ignored_updates: self.ignored_updates(),
            passes: self.passes(),
            received: self.received(),
            sent: self.sent(),
        }
    }
}

/// A point-in-time copy of [`MarkerStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MarkerStatsSnapshot {
    /// Last persisted checkpoint.
    pub last_marked_segment: Option<u64>,
    /// Successful marker writes.
    pub marks_written: u64,
    /// Failed marker writes.
    pub mark_failures: u64,
    /// Segments force-resolved by age.
    pub forced_resolutions: u64,
    /// Updates dropped for checkpointed segments.
    pub ignored_updates: u64,
    /// Advancement passes run.
    pub passes: u64,
    /// Entries reported as received.
    pub received: u64,
    /// Entries reported as sent.
    pub sent: u64,
}
