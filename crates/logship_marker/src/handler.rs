//! Checkpoint orchestration.
//!
//! The [`MarkerHandler`] sits between the WAL reader and the senders. The
//! reader reports how many entries it handed out per segment, the senders
//! report how many were acknowledged, and after every report the handler
//! tries to move the checkpoint forward. A background thread repeats the
//! attempt on a fixed tick so that segments which stop receiving traffic
//! still age out.
//!
//! # Usage
//!
//! ```rust,no_run
//! use logship_marker::{MarkerConfig, MarkerHandler, MarkerStore};
//! use std::path::Path;
//!
//! let config = MarkerConfig::new().client_id("loki-0");
//! let store = MarkerStore::open_with_config(Path::new("/var/lib/agent/wal"), &config)?;
//! let handler = MarkerHandler::new(store, config)?;
//!
//! // WAL reader
//! handler.update_received_data(11, 10);
//! // Senders, on acknowledgment
//! handler.update_sent_data(11, 10);
//!
//! assert_eq!(handler.last_marked_segment(), Some(11));
//! handler.stop();
//! # Ok::<(), logship_marker::MarkerError>(())
//! ```

use crate::config::MarkerConfig;
use crate::error::MarkerResult;
use crate::stats::MarkerStats;
use crate::store::MarkerStore;
use crate::tracker::{CountDataItem, DeliveryTracker};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Span};

/// Lifecycle of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Constructed, background task not started yet.
    ///
    /// Only held inside the constructor; a returned handler is already
    /// [`HandlerState::Running`].
    Created,
    /// Background task running.
    Running,
    /// Background task stopped. Terminal.
    Stopped,
}

/// Tracks delivery per WAL segment and persists the checkpoint.
pub struct MarkerHandler {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner {
    store: MarkerStore,
    tracker: DeliveryTracker,
    max_segment_age: Duration,
    stats: Arc<MarkerStats>,
    span: Span,
    state: Mutex<HandlerState>,
    /// Candidate that was resolved but failed to persist.
    ///
    /// The lock also serializes advancement passes.
    unpersisted: Mutex<Option<u64>>,
}

impl MarkerHandler {
    /// Creates a handler with its own stats and starts the background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the background
    /// thread cannot be spawned.
    pub fn new(store: MarkerStore, config: MarkerConfig) -> MarkerResult<Self> {
        Self::with_stats(store, config, Arc::new(MarkerStats::new()))
    }

    /// Creates a handler that reports into `stats`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the background
    /// thread cannot be spawned.
    pub fn with_stats(
        store: MarkerStore,
        config: MarkerConfig,
        stats: Arc<MarkerStats>,
    ) -> MarkerResult<Self> {
        config.validate()?;

        let span = info_span!("segment_marker", client = %config.client_id);
        let initial = store.last_marked_segment();
        let tracker = DeliveryTracker::new();
        if let Some(segment) = initial {
            tracker.discard_through(segment);
        }
        stats.set_last_marked_segment(initial);
        span.in_scope(|| debug!(last_marked = ?initial, "starting segment marker"));

        let inner = Arc::new(Inner {
            store,
            tracker,
            max_segment_age: config.max_segment_age,
            stats,
            span,
            state: Mutex::new(HandlerState::Created),
            unpersisted: Mutex::new(None),
        });

        let (stop_tx, stop_rx) = mpsc::channel();
        let thread_inner = Arc::clone(&inner);
        let tick = config.tick_interval;
        let handle = thread::Builder::new()
            .name(format!("segment-marker-{}", config.client_id))
            .spawn(move || run_ticker(&thread_inner, &stop_rx, tick))?;
        *inner.state.lock() = HandlerState::Running;

        Ok(Self {
            inner,
            worker: Mutex::new(Some(Worker { stop_tx, handle })),
        })
    }

    /// Records `n` entries read from `segment` and tries to advance.
    ///
    /// Updates for segments already covered by the checkpoint are ignored.
    pub fn update_received_data(&self, segment: u64, n: i64) {
        let _enter = self.inner.span.enter();
        if self.inner.tracker.update_received_data(segment, n) {
            self.inner
                .stats
                .record_received(counted_entries("received", segment, n));
        } else {
            self.inner.ignore_update("received", segment);
        }
        // Persist failures are logged and retried on the next pass.
        let _ = self.inner.advance();
    }

    /// Records `n` entries from `segment` acknowledged downstream and tries
    /// to advance.
    ///
    /// Updates for segments already covered by the checkpoint are ignored.
    pub fn update_sent_data(&self, segment: u64, n: i64) {
        let _enter = self.inner.span.enter();
        if self.inner.tracker.update_sent_data(segment, n) {
            self.inner
                .stats
                .record_sent(counted_entries("sent", segment, n));
        } else {
            self.inner.ignore_update("sent", segment);
        }
        let _ = self.inner.advance();
    }

    /// Runs one advancement pass now.
    ///
    /// Returns the newly persisted checkpoint, or `None` if it did not move.
    ///
    /// # Errors
    ///
    /// Returns the store error if persisting failed. The candidate is kept
    /// and retried by the next pass.
    pub fn advance(&self) -> MarkerResult<Option<u64>> {
        let _enter = self.inner.span.enter();
        self.inner.advance()
    }

    /// Returns the last persisted checkpoint.
    #[must_use]
    pub fn last_marked_segment(&self) -> Option<u64> {
        self.inner.store.last_marked_segment()
    }

    /// Returns the segments that are still tracked.
    #[must_use]
    pub fn pending_segments(&self) -> Vec<(u64, CountDataItem)> {
        self.inner.tracker.snapshot()
    }

    /// Returns the stats this handler reports into.
    #[must_use]
    pub fn stats(&self) -> &Arc<MarkerStats> {
        &self.inner.stats
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &MarkerStore {
        &self.inner.store
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandlerState {
        *self.inner.state.lock()
    }

    /// Stops the background task and runs one final advancement pass.
    ///
    /// Only the first call does anything. Update calls remain usable after
    /// stopping; they keep advancing the checkpoint inline.
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _enter = self.inner.span.enter();

        // The receiver may already be gone if the thread panicked.
        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            warn!("segment marker background task panicked");
        }
        *self.inner.state.lock() = HandlerState::Stopped;

        if let Err(e) = self.inner.advance() {
            warn!(error = %e, "final checkpoint flush failed");
        }
        debug!(last_marked = ?self.last_marked_segment(), "segment marker stopped");
    }
}

impl Drop for MarkerHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MarkerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerHandler")
            .field("state", &self.state())
            .field("last_marked_segment", &self.last_marked_segment())
            .field("pending", &self.inner.tracker.len())
            .finish()
    }
}

impl Inner {
    fn ignore_update(&self, kind: &'static str, segment: u64) {
        self.stats.record_ignored_update();
        debug!(
            kind,
            segment,
            last_marked = ?self.store.last_marked_segment(),
            "ignoring update for checkpointed segment"
        );
    }

    fn advance(&self) -> MarkerResult<Option<u64>> {
        // Held for the whole pass so a walk and the write of its result are
        // never interleaved with another pass.
        let mut unpersisted = self.unpersisted.lock();
        let resolution = self.tracker.find_markable_segment(self.max_segment_age);
        self.stats.record_pass();
        if resolution.forced > 0 {
            self.stats.record_forced(resolution.forced as u64);
            warn!(
                forced = resolution.forced,
                max_segment_age = ?self.max_segment_age,
                "segments aged out with unacknowledged data"
            );
        }

        let candidate = match (resolution.markable, *unpersisted) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let current = self.store.last_marked_segment();
        if current.is_some_and(|c| candidate <= c) {
            *unpersisted = None;
            return Ok(None);
        }

        match self.store.mark_segment(candidate) {
            Ok(()) => {
                *unpersisted = None;
                self.tracker.discard_through(candidate);
                self.stats.record_mark();
                self.stats.set_last_marked_segment(Some(candidate));
                info!(segment = candidate, previous = ?current, "advanced segment marker");
                Ok(Some(candidate))
            }
            Err(e) => {
                *unpersisted = Some(candidate);
                self.stats.record_mark_failure();
                warn!(segment = candidate, error = %e, "failed to persist segment marker");
                Err(e)
            }
        }
    }
}

/// Entries added to the stats totals for one update.
///
/// Negative updates adjust the tracked count but are not added to totals.
fn counted_entries(kind: &'static str, segment: u64, n: i64) -> u64 {
    if n < 0 {
        debug!(kind, segment, n, "negative update excluded from totals");
    }
    u64::try_from(n).unwrap_or(0)
}

fn run_ticker(inner: &Inner, stop_rx: &Receiver<()>, tick: Duration) {
    let _enter = inner.span.enter();
    loop {
        match stop_rx.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {
                let _ = inner.advance();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::store::{marker_dir, marker_path, read_marker_file};
    use std::fs;
    use std::time::Instant;
    use tempfile::{tempdir, TempDir};

    fn config() -> MarkerConfig {
        MarkerConfig::new()
            .client_id("test")
            .max_segment_age(Duration::from_secs(60))
            .tick_interval(Duration::from_millis(20))
    }

    fn open(temp: &TempDir, config: MarkerConfig) -> MarkerHandler {
        let store = MarkerStore::open_with_config(temp.path(), &config).unwrap();
        MarkerHandler::new(store, config).unwrap()
    }

    fn wait_for(handler: &MarkerHandler, expected: Option<u64>) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if handler.last_marked_segment() == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn starts_from_existing_marker() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(marker_dir(temp.path())).unwrap();
        fs::write(marker_path(temp.path()), codec::encode(10)).unwrap();

        let handler = open(&temp, config());
        assert_eq!(handler.last_marked_segment(), Some(10));
        assert_eq!(handler.stats().last_marked_segment(), Some(10));
        assert_eq!(handler.state(), HandlerState::Running);
    }

    #[test]
    fn constructed_handler_is_running() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config());
        assert_eq!(handler.state(), HandlerState::Running);
        handler.stop();
        assert_eq!(handler.state(), HandlerState::Stopped);
    }

    #[test]
    fn negative_updates_excluded_from_totals() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config());

        handler.update_received_data(3, 5);
        handler.update_received_data(3, -2);
        handler.update_sent_data(3, -1);

        assert_eq!(handler.stats().received(), 5);
        assert_eq!(handler.stats().sent(), 0);
        let pending = handler.pending_segments();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.count, 4);

        handler.update_sent_data(3, 4);
        assert_eq!(handler.last_marked_segment(), Some(3));
        assert_eq!(handler.stats().sent(), 4);
    }

    #[test]
    fn unacknowledged_head_holds_checkpoint() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config());

        for segment in 1..10u64 {
            handler.update_received_data(segment, 2);
        }
        for segment in 2..10u64 {
            handler.update_sent_data(segment, 2);
        }
        assert_eq!(handler.last_marked_segment(), None);
        assert_eq!(handler.pending_segments().len(), 9);

        handler.update_sent_data(1, 2);
        assert_eq!(handler.last_marked_segment(), Some(9));
        assert!(handler.pending_segments().is_empty());
    }

    #[test]
    fn acknowledged_segment_is_marked() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config());

        handler.update_received_data(11, 10);
        handler.update_sent_data(11, 5);
        handler.update_sent_data(11, 5);

        assert!(wait_for(&handler, Some(11)));
        let persisted = read_marker_file(&handler.store().marker_path()).unwrap();
        assert_eq!(persisted, Some(11));
        assert!(handler.pending_segments().is_empty());
    }

    #[test]
    fn unacknowledged_segment_blocks_progress() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config());

        handler.update_received_data(1, 3);
        handler.update_received_data(2, 3);
        handler.update_sent_data(2, 3);

        assert_eq!(handler.last_marked_segment(), None);
        assert_eq!(handler.pending_segments().len(), 2);

        handler.update_sent_data(1, 3);
        assert_eq!(handler.last_marked_segment(), Some(2));
    }

    #[test]
    fn background_tick_ages_out_stuck_segment() {
        let temp = tempdir().unwrap();
        let handler = open(
            &temp,
            config().max_segment_age(Duration::from_millis(50)),
        );

        handler.update_received_data(4, 100);
        assert_eq!(handler.last_marked_segment(), None);

        assert!(wait_for(&handler, Some(4)));
        assert!(handler.stats().forced_resolutions() >= 1);
    }

    #[test]
    fn late_updates_for_marked_segments_are_ignored() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config());

        handler.update_received_data(5, 1);
        handler.update_sent_data(5, 1);
        assert_eq!(handler.last_marked_segment(), Some(5));

        handler.update_sent_data(3, 7);
        handler.update_received_data(5, 2);
        assert!(handler.pending_segments().is_empty());
        assert_eq!(handler.stats().ignored_updates(), 2);

        handler.update_received_data(6, 1);
        handler.update_sent_data(6, 1);
        assert_eq!(handler.last_marked_segment(), Some(6));
    }

    #[test]
    fn checkpoint_never_regresses() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(marker_dir(temp.path())).unwrap();
        fs::write(marker_path(temp.path()), codec::encode(20)).unwrap();
        let handler = open(&temp, config());

        handler.update_received_data(21, 1);
        handler.update_sent_data(21, 1);
        assert_eq!(handler.last_marked_segment(), Some(21));
        assert_eq!(handler.advance().unwrap(), None);
        assert_eq!(handler.last_marked_segment(), Some(21));
    }

    #[cfg(unix)]
    #[test]
    fn failed_persist_is_retried() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let handler = open(&temp, config().tick_interval(Duration::from_secs(3600)));
        let dir = handler.store().dir().to_path_buf();

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o500)).unwrap();
        // Privileged users ignore directory permissions.
        let writable = fs::write(dir.join("probe"), b"x").is_ok();

        handler.update_received_data(2, 1);
        handler.update_sent_data(2, 1);

        if !writable {
            assert_eq!(handler.last_marked_segment(), None);
            assert_eq!(handler.stats().mark_failures(), 1);
            assert!(handler.pending_segments().is_empty());
        }

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)).unwrap();
        handler.advance().ok();
        assert_eq!(handler.last_marked_segment(), Some(2));
    }

    #[test]
    fn stop_is_idempotent_and_flushes() {
        let temp = tempdir().unwrap();
        let handler = open(&temp, config().tick_interval(Duration::from_secs(3600)));

        handler.stop();
        assert_eq!(handler.state(), HandlerState::Stopped);
        handler.stop();

        handler.update_received_data(1, 1);
        handler.update_sent_data(1, 1);
        assert_eq!(handler.last_marked_segment(), Some(1));
    }

    #[test]
    fn drop_releases_store_lock() {
        let temp = tempdir().unwrap();
        {
            let handler = open(&temp, config());
            handler.update_received_data(9, 2);
            handler.update_sent_data(9, 2);
        }

        let store = MarkerStore::open(temp.path()).unwrap();
        assert_eq!(store.last_marked_segment(), Some(9));
    }

    #[test]
    fn invalid_config_rejected() {
        let temp = tempdir().unwrap();
        let store = MarkerStore::open(temp.path()).unwrap();
        let result = MarkerHandler::new(store, config().tick_interval(Duration::ZERO));
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_senders_reach_final_checkpoint() {
        let temp = tempdir().unwrap();
        let handler = Arc::new(open(&temp, config()));

        for segment in 0..8u64 {
            handler.update_received_data(segment, 40);
        }

        let mut handles = vec![];
        for _ in 0..4 {
            let handler = Arc::clone(&handler);
            handles.push(thread::spawn(move || {
                for segment in 0..8u64 {
                    for _ in 0..10 {
                        handler.update_sent_data(segment, 1);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(handler.last_marked_segment(), Some(7));
        assert_eq!(handler.stats().mark_failures(), 0);
    }

    #[test]
    fn checkpoint_monotonic_under_racing_ticks() {
        let temp = tempdir().unwrap();
        let handler = Arc::new(open(
            &temp,
            config()
                .max_segment_age(Duration::from_millis(3))
                .tick_interval(Duration::from_millis(1)),
        ));

        let mut handles = vec![];
        for worker in 0..4u64 {
            let handler = Arc::clone(&handler);
            handles.push(thread::spawn(move || {
                let mut last = None;
                for step in 0..15u64 {
                    let segment = step * 4 + worker + 1;
                    handler.update_received_data(segment, 2);
                    handler.update_sent_data(segment, 1);
                    let seen = handler.last_marked_segment();
                    assert!(seen >= last, "checkpoint regressed: {last:?} -> {seen:?}");
                    last = seen;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert!(wait_for(&handler, Some(60)));
        let persisted = read_marker_file(&handler.store().marker_path()).unwrap();
        assert_eq!(persisted, handler.last_marked_segment());
    }
}
