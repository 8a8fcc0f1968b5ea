//! Resume command implementation.

use logship_marker::{
    list_segments, marker_path, next_segment_after, read_marker_file, truncatable_segments,
};
use serde::Serialize;
use std::path::Path;

/// Where a reader would resume.
#[derive(Debug, Serialize)]
pub struct ResumeReport {
    /// Segments present in the WAL directory.
    pub segments: Vec<u64>,
    /// Checkpoint recorded in the marker.
    pub last_marked_segment: Option<u64>,
    /// First segment to read.
    pub next_segment: Option<u64>,
    /// Segments safe to delete.
    pub truncatable: Vec<u64>,
}

/// Builds the resume report for a WAL directory.
pub fn report(wal_dir: &Path) -> Result<ResumeReport, Box<dyn std::error::Error>> {
    let segments = list_segments(wal_dir)?;
    let marked = read_marker_file(&marker_path(wal_dir))?;

    Ok(ResumeReport {
        next_segment: next_segment_after(&segments, marked),
        truncatable: truncatable_segments(&segments, marked),
        last_marked_segment: marked,
        segments,
    })
}

/// Runs the resume command.
pub fn run(wal_dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = report(wal_dir)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("WAL Resume Point");
    println!("================");
    println!("Segments on disk: {}", report.segments.len());
    match (report.segments.first(), report.segments.last()) {
        (Some(first), Some(last)) => println!("Range:            {first}..={last}"),
        _ => println!("Range:            (empty)"),
    }
    match report.last_marked_segment {
        Some(segment) => println!("Checkpoint:       {segment}"),
        None => println!("Checkpoint:       none"),
    }
    match report.next_segment {
        Some(segment) => println!("Resume at:        {segment}"),
        None => println!("Resume at:        newest segment (nothing after checkpoint)"),
    }
    println!("Truncatable:      {} segment(s)", report.truncatable.len());

    Ok(())
}
