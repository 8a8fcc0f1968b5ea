//! Inspect command implementation.

use logship_marker::{codec, marker_path};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Marker inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Marker file path.
    pub path: String,
    /// Whether the marker file exists.
    pub exists: bool,
    /// Marker file size in bytes.
    pub size: u64,
    /// Permission bits, on platforms that have them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Decoded checkpoint.
    pub segment: Option<u64>,
    /// Raw record bytes as hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Decode error, if the record is unreadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reads the marker under a WAL directory without locking it.
pub fn inspect(wal_dir: &Path) -> io::Result<InspectResult> {
    let path = marker_path(wal_dir);
    let mut result = InspectResult {
        path: path.display().to_string(),
        exists: false,
        size: 0,
        mode: None,
        segment: None,
        raw: None,
        error: None,
    };

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(result),
        Err(e) => return Err(e),
    };

    result.exists = true;
    result.size = data.len() as u64;
    result.mode = file_mode(&path)?;
    result.raw = Some(data.iter().map(|b| format!("{b:02x}")).collect());
    match codec::decode(&data) {
        Ok(segment) => result.segment = Some(segment),
        Err(e) => result.error = Some(e.to_string()),
    }

    Ok(result)
}

#[cfg(unix)]
fn file_mode(path: &Path) -> io::Result<Option<String>> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    Ok(Some(format!("{mode:04o}")))
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> io::Result<Option<String>> {
    Ok(None)
}

/// Runs the inspect command.
pub fn run(wal_dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(wal_dir)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("Segment Marker");
    println!("==============");
    println!("Path:    {}", result.path);

    if !result.exists {
        println!("Status:  no marker (WAL will be read from the first segment)");
        return;
    }

    println!("Size:    {} bytes", result.size);
    if let Some(mode) = &result.mode {
        println!("Mode:    {mode}");
    }
    if let Some(raw) = &result.raw {
        println!("Raw:     {raw}");
    }
    match (&result.segment, &result.error) {
        (Some(segment), _) => println!("Segment: {segment}"),
        (None, Some(error)) => println!("Error:   {error}"),
        (None, None) => {}
    }
}
