//! Verify command implementation.

use logship_marker::{marker_path, read_marker_file, MarkerResult};
use std::path::Path;

/// Decodes the marker under a WAL directory.
///
/// Returns `Ok(None)` when there is no marker.
pub fn verify(wal_dir: &Path) -> MarkerResult<Option<u64>> {
    read_marker_file(&marker_path(wal_dir))
}

/// Runs the verify command.
pub fn run(wal_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying segment marker at {:?}", marker_path(wal_dir));
    println!();

    match verify(wal_dir) {
        Ok(Some(segment)) => {
            println!("✓ Marker valid, checkpoint at segment {segment}");
            Ok(())
        }
        Ok(None) => {
            println!("✓ No marker present (this is normal before the first checkpoint)");
            Ok(())
        }
        Err(e) if e.is_corruption() => {
            println!("✗ Marker corrupted: {e}");
            println!("  Use `logship reset --yes` to replay the WAL from the start,");
            println!("  or `logship set <segment>` to record a known-good checkpoint.");
            Err("Verification failed".into())
        }
        Err(e) => Err(e.into()),
    }
}
