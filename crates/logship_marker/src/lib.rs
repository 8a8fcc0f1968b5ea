//! # logship marker
//!
//! Checkpointing for the agent's write-ahead log.
//!
//! Log entries are buffered in a segmented WAL before they are shipped. This
//! crate tracks, per segment, how many entries were read and how many were
//! acknowledged downstream, and persists the highest segment that is fully
//! delivered. On restart the WAL reader resumes after that segment, and
//! everything at or below it can be deleted.
//!
//! - [`codec`] - the 14-byte checksummed marker record
//! - [`MarkerStore`] - crash-safe storage of one checkpoint
//! - [`DeliveryTracker`] - outstanding entries per segment
//! - [`find_markable_segment`] - the in-order advancement walk
//! - [`MarkerHandler`] - ties the above together with a background tick
//!
//! ## Guarantees
//!
//! - The checkpoint never moves backwards.
//! - A segment is never checkpointed while a lower tracked segment still has
//!   unacknowledged data, unless that lower segment has made no progress for
//!   longer than `max_segment_age`.
//! - A failed write leaves the previous checkpoint in place and is retried.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod advancer;
pub mod codec;
mod config;
mod error;
mod handler;
mod resume;
mod stats;
mod store;
mod tracker;

pub use advancer::{find_markable_segment, find_markable_segment_at, Resolution};
pub use config::{CorruptionPolicy, MarkerConfig};
pub use error::{MarkerError, MarkerResult};
pub use handler::{HandlerState, MarkerHandler};
pub use resume::{list_segments, next_segment_after, truncatable_segments, Marker};
pub use stats::{MarkerStats, MarkerStatsSnapshot};
pub use store::{
    marker_dir, marker_path, read_marker_file, MarkerStore, MARKER_DIR_MODE, MARKER_DIR_NAME,
    MARKER_FILE_MODE, MARKER_FILE_NAME,
};
pub use tracker::{CountDataItem, DeliveryTracker};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
