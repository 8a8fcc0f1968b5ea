//! Test fixtures for marker directories.

use logship_marker::{codec, marker_dir, marker_path, MarkerConfig, MarkerHandler, MarkerStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Configuration with short timings suited to tests.
pub fn fast_config() -> MarkerConfig {
    MarkerConfig::new()
        .client_id("testkit")
        .max_segment_age(Duration::from_secs(60))
        .tick_interval(Duration::from_millis(10))
}

/// A temporary WAL directory with automatic cleanup.
pub struct TestMarkerDir {
    temp_dir: TempDir,
}

impl TestMarkerDir {
    /// Creates a new empty WAL directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the WAL directory path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the marker file path.
    pub fn marker_path(&self) -> PathBuf {
        marker_path(self.path())
    }

    /// Writes raw bytes as the marker file, bypassing the store.
    pub fn write_raw_marker(&self, bytes: &[u8]) {
        fs::create_dir_all(marker_dir(self.path())).expect("Failed to create marker dir");
        fs::write(self.marker_path(), bytes).expect("Failed to write marker");
    }

    /// Writes a valid marker for `segment`, bypassing the store.
    pub fn write_marker(&self, segment: u64) {
        self.write_raw_marker(&codec::encode(segment));
    }

    /// Reads the marker file as it is on disk.
    pub fn read_marker(&self) -> Option<u64> {
        logship_marker::read_marker_file(&self.marker_path()).expect("Failed to read marker")
    }

    /// Creates empty WAL segment files with the given numbers.
    pub fn create_segments(&self, segments: impl IntoIterator<Item = u64>) {
        for segment in segments {
            fs::write(self.path().join(format!("{segment:08}")), b"")
                .expect("Failed to create segment file");
        }
    }

    /// Opens a store with [`fast_config`].
    pub fn store(&self) -> MarkerStore {
        self.store_with(&fast_config())
    }

    /// Opens a store with the given configuration.
    pub fn store_with(&self, config: &MarkerConfig) -> MarkerStore {
        MarkerStore::open_with_config(self.path(), config).expect("Failed to open marker store")
    }

    /// Opens a handler with [`fast_config`].
    pub fn handler(&self) -> MarkerHandler {
        self.handler_with(fast_config())
    }

    /// Opens a handler with the given configuration.
    pub fn handler_with(&self, config: MarkerConfig) -> MarkerHandler {
        let store = self.store_with(&config);
        MarkerHandler::new(store, config).expect("Failed to start marker handler")
    }
}

impl Default for TestMarkerDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a handler over a fresh WAL directory.
pub fn with_handler<F, R>(f: F) -> R
where
    F: FnOnce(&MarkerHandler, &TestMarkerDir) -> R,
{
    let dir = TestMarkerDir::new();
    let handler = dir.handler();
    f(&handler, &dir)
}

/// Polls until the handler reports `expected` or `timeout` elapses.
pub fn wait_for_mark(handler: &MarkerHandler, expected: Option<u64>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if handler.last_marked_segment() == expected {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
