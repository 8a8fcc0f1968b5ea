//! Set and reset command implementations.
//!
//! Both take the marker directory lock, so they refuse to run while an
//! agent is shipping from the same WAL directory.

use logship_marker::{CorruptionPolicy, MarkerConfig, MarkerStore};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Errors specific to marker rewrites.
#[derive(Debug, Error)]
pub enum MarkError {
    /// A destructive command was run without `--yes`.
    #[error("refusing to remove the marker without --yes")]
    ConfirmationRequired,
}

fn open_for_repair(wal_dir: &Path) -> Result<MarkerStore, Box<dyn std::error::Error>> {
    // An operator rewriting the marker is replacing whatever is there.
    let config = MarkerConfig::new().corruption_policy(CorruptionPolicy::Reset);
    Ok(MarkerStore::open_with_config(wal_dir, &config)?)
}

/// Overwrites the checkpoint with `segment`.
pub fn set(wal_dir: &Path, segment: u64) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_for_repair(wal_dir)?;
    let previous = store.last_marked_segment();
    if previous.is_some_and(|p| segment < p) {
        warn!(
            previous = ?previous,
            segment,
            "moving checkpoint backwards, segments in between will be re-sent"
        );
    }

    store.mark_segment(segment)?;
    info!(segment, previous = ?previous, "segment marker written");
    println!("Checkpoint set to segment {segment}");
    Ok(())
}

/// Removes the marker file.
pub fn reset(wal_dir: &Path, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        return Err(MarkError::ConfirmationRequired.into());
    }

    let store = open_for_repair(wal_dir)?;
    let previous = store.last_marked_segment();
    store.clear()?;
    info!(previous = ?previous, "segment marker removed");
    println!("Marker removed, WAL will be replayed from the first segment");
    Ok(())
}
