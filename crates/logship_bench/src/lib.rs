//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use std::collections::BTreeMap;
use std::time::Instant;

use logship_marker::CountDataItem;

/// Builds a tracker map with `segments` entries, all delivered except
/// every `pending_every`-th one (0 disables pending entries).
pub fn tracked_segments(segments: u64, pending_every: u64) -> BTreeMap<u64, CountDataItem> {
    let now = Instant::now();
    (0..segments)
        .map(|segment| {
            let pending = pending_every != 0 && segment % pending_every == pending_every - 1;
            let count = if pending { 1 } else { 0 };
            (
                segment,
                CountDataItem {
                    count,
                    last_update: now,
                },
            )
        })
        .collect()
}

/// Generates random `(segment, count)` reports over `segments` segments.
pub fn random_reports(count: usize, segments: u64) -> Vec<(u64, i64)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| (rng.gen_range(0..segments), rng.gen_range(1..100)))
        .collect()
}
