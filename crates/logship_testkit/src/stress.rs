//! Stress tests for the marker handler.
//!
//! One reader thread reports entries per segment while several sender
//! threads acknowledge them, the way a shipping pipeline drives the handler.

use logship_marker::MarkerHandler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total update calls made.
    pub total_ops: u64,
    /// Checkpoint reached when the run finished.
    pub final_checkpoint: Option<u64>,
    /// Whether the checkpoint was ever observed moving backwards.
    pub regressed: bool,
    /// Total duration.
    pub duration: Duration,
    /// Update calls per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    fn new(total_ops: u64, final_checkpoint: Option<u64>, regressed: bool, duration: Duration) -> Self {
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total_ops as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops,
            final_checkpoint,
            regressed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total updates: {}", self.total_ops);
        println!("Final checkpoint: {:?}", self.final_checkpoint);
        println!("Regressed: {}", self.regressed);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of WAL segments to read.
    pub segments: u64,
    /// Entries read per segment.
    pub entries_per_segment: i64,
    /// Entries acknowledged per sender call.
    pub batch_size: i64,
    /// Number of sender threads.
    pub senders: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            segments: 64,
            entries_per_segment: 200,
            batch_size: 10,
            senders: 4,
        }
    }
}

/// Runs a reader and a pool of senders against `handler`.
///
/// The reader reports each segment in order and queues its entries in
/// batches; senders pull batches off the queue and acknowledge them. A
/// watcher thread samples the checkpoint to detect regressions.
pub fn stress_pipeline(handler: &Arc<MarkerHandler>, config: &StressConfig) -> StressTestResult {
    let ops = Arc::new(AtomicU64::new(0));
    let (batch_tx, batch_rx) = mpsc::channel::<(u64, i64)>();
    let batch_rx = Arc::new(Mutex::new(batch_rx));
    let start = Instant::now();

    let done = Arc::new(AtomicBool::new(false));
    let watcher = {
        let handler = Arc::clone(handler);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last = handler.last_marked_segment();
            let mut regressed = false;
            while !done.load(Ordering::Acquire) {
                let now = handler.last_marked_segment();
                regressed |= now < last;
                last = now;
                thread::yield_now();
            }
            regressed
        })
    };

    let senders: Vec<_> = (0..config.senders)
        .map(|_| {
            let handler = Arc::clone(handler);
            let batch_rx = Arc::clone(&batch_rx);
            let ops = Arc::clone(&ops);
            thread::spawn(move || {
                loop {
                    let next = batch_rx.lock().recv();
                    let Ok((segment, n)) = next else {
                        break;
                    };
                    handler.update_sent_data(segment, n);
                    ops.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for segment in 0..config.segments {
        handler.update_received_data(segment, config.entries_per_segment);
        ops.fetch_add(1, Ordering::Relaxed);
        let mut remaining = config.entries_per_segment;
        while remaining > 0 {
            let n = remaining.min(config.batch_size);
            // Senders only stop once the queue is closed below.
            let _ = batch_tx.send((segment, n));
            remaining -= n;
        }
    }
    drop(batch_tx);

    for sender in senders {
        sender.join().expect("Sender thread panicked");
    }
    done.store(true, Ordering::Release);
    let regressed = watcher.join().expect("Watcher thread panicked");

    StressTestResult::new(
        ops.load(Ordering::Relaxed),
        handler.last_marked_segment(),
        regressed,
        start.elapsed(),
    )
}
