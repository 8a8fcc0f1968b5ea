//! Property-based test generators using proptest.
//!
//! Provides strategies for delivery workloads: the stream of receive and
//! acknowledge reports a WAL reader and its senders would produce.

use logship_marker::{DeliveryTracker, MarkerHandler};
use proptest::prelude::*;

/// One report into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOp {
    /// The WAL reader handed out `n` entries from `segment`.
    Received {
        /// Segment number.
        segment: u64,
        /// Entry count.
        n: i64,
    },
    /// Senders acknowledged `n` entries from `segment`.
    Sent {
        /// Segment number.
        segment: u64,
        /// Entry count.
        n: i64,
    },
}

impl DeliveryOp {
    /// Returns the segment this op refers to.
    pub fn segment(&self) -> u64 {
        match *self {
            Self::Received { segment, .. } | Self::Sent { segment, .. } => segment,
        }
    }

    /// Applies the op to a tracker.
    pub fn apply_to_tracker(&self, tracker: &DeliveryTracker) {
        match *self {
            Self::Received { segment, n } => {
                tracker.update_received_data(segment, n);
            }
            Self::Sent { segment, n } => {
                tracker.update_sent_data(segment, n);
            }
        }
    }

    /// Applies the op to a handler.
    pub fn apply_to_handler(&self, handler: &MarkerHandler) {
        match *self {
            Self::Received { segment, n } => handler.update_received_data(segment, n),
            Self::Sent { segment, n } => handler.update_sent_data(segment, n),
        }
    }
}

/// Strategy for segment numbers.
pub fn segment_strategy() -> impl Strategy<Value = u64> {
    0u64..1_000
}

/// Strategy for per-report entry counts.
pub fn count_strategy() -> impl Strategy<Value = i64> {
    1i64..64
}

/// Splits `total` into acknowledgment batches of at most `batch` entries.
fn ack_batches(segment: u64, total: i64, batch: i64) -> Vec<DeliveryOp> {
    let mut ops = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(batch);
        ops.push(DeliveryOp::Sent { segment, n });
        remaining -= n;
    }
    ops
}

/// Strategy for a workload where every entry read is eventually
/// acknowledged, with reports arriving in arbitrary order.
///
/// Segments are numbered `0..segments`.
pub fn balanced_workload_strategy(segments: u64) -> impl Strategy<Value = Vec<DeliveryOp>> {
    let segments = usize::try_from(segments).unwrap_or(usize::MAX);
    prop::collection::vec((count_strategy(), 1i64..16), segments)
        .prop_map(|plan| {
            let mut ops = Vec::new();
            for (segment, (total, batch)) in plan.into_iter().enumerate() {
                let segment = segment as u64;
                ops.push(DeliveryOp::Received { segment, n: total });
                ops.extend(ack_batches(segment, total, batch));
            }
            ops
        })
        .prop_shuffle()
}

/// Strategy for a workload in reading order: each segment is read before
/// any of its acknowledgments, and some acknowledgments may be missing.
pub fn ordered_workload_strategy(segments: u64) -> impl Strategy<Value = Vec<DeliveryOp>> {
    let segments = usize::try_from(segments).unwrap_or(usize::MAX);
    prop::collection::vec((count_strategy(), any::<bool>()), segments).prop_map(|plan| {
        let mut ops = Vec::new();
        for (segment, (total, acked)) in plan.into_iter().enumerate() {
            let segment = segment as u64;
            ops.push(DeliveryOp::Received { segment, n: total });
            if acked {
                ops.push(DeliveryOp::Sent { segment, n: total });
            }
        }
        ops
    })
}

/// Returns the checkpoint a fully-processed ordered workload should reach
/// without any aging: the segment just before the first unacknowledged one.
pub fn expected_checkpoint(ops: &[DeliveryOp]) -> Option<u64> {
    let mut outstanding = std::collections::BTreeMap::new();
    for op in ops {
        let entry = outstanding.entry(op.segment()).or_insert(0i64);
        match *op {
            DeliveryOp::Received { n, .. } => *entry += n,
            DeliveryOp::Sent { n, .. } => *entry -= n,
        }
    }
    let mut marked = None;
    for (segment, count) in outstanding {
        if count != 0 {
            break;
        }
        marked = Some(segment);
    }
    marked
}
