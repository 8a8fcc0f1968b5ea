//! End-to-end checkpoint scenarios.

use logship_marker::{
    codec, find_markable_segment_at, marker_dir, marker_path, read_marker_file, CountDataItem,
    MarkerConfig, MarkerHandler, MarkerStore,
};
use std::collections::BTreeMap;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const TTL: Duration = Duration::from_secs(60);

fn tracked(entries: &[(u64, i64, Instant)]) -> BTreeMap<u64, CountDataItem> {
    entries
        .iter()
        .map(|&(segment, count, last_update)| (segment, CountDataItem { count, last_update }))
        .collect()
}

#[test]
fn all_fresh_and_delivered() {
    let now = Instant::now();
    let mut data = tracked(&[(1, 0, now), (2, 0, now), (3, 0, now), (4, 0, now)]);

    assert_eq!(find_markable_segment_at(&mut data, TTL, now).markable, Some(4));
}

#[test]
fn stale_pending_segment_is_skipped_over() {
    let base = Instant::now();
    let now = base + Duration::from_secs(120);
    let mut data = tracked(&[(1, 0, now), (2, 0, now), (3, 10, base), (4, 0, now)]);

    assert_eq!(find_markable_segment_at(&mut data, TTL, now).markable, Some(4));
    assert!(data.is_empty());
}

#[test]
fn fresh_pending_segment_holds_the_line() {
    let now = Instant::now();
    let mut data = tracked(&[(1, 0, now), (2, 0, now), (3, 10, now), (4, 0, now)]);

    assert_eq!(find_markable_segment_at(&mut data, TTL, now).markable, Some(2));
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
}

#[test]
fn nothing_delivered() {
    let now = Instant::now();
    let mut data = tracked(&[(1, 11, now), (2, 5, now), (3, 10, now), (4, 2, now)]);

    assert_eq!(find_markable_segment_at(&mut data, TTL, now).markable, None);
    assert_eq!(data.len(), 4);
}

#[test]
fn handler_reports_existing_marker_before_updates() {
    let temp = tempdir().unwrap();
    fs::create_dir_all(marker_dir(temp.path())).unwrap();
    fs::write(marker_path(temp.path()), codec::encode(10)).unwrap();

    let store = MarkerStore::open(temp.path()).unwrap();
    let handler = MarkerHandler::new(store, MarkerConfig::default()).unwrap();

    assert_eq!(handler.last_marked_segment(), Some(10));
}

#[test]
fn handler_marks_segment_after_split_acks() {
    let temp = tempdir().unwrap();
    let config = MarkerConfig::new()
        .max_segment_age(TTL)
        .tick_interval(Duration::from_millis(25));
    let store = MarkerStore::open_with_config(temp.path(), &config).unwrap();
    let handler = MarkerHandler::new(store, config).unwrap();

    handler.update_received_data(11, 10);
    handler.update_sent_data(11, 5);
    handler.update_sent_data(11, 5);

    let deadline = Instant::now() + Duration::from_secs(2);
    while handler.last_marked_segment() != Some(11) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(handler.last_marked_segment(), Some(11));
    let persisted = read_marker_file(&marker_path(temp.path())).unwrap();
    assert_eq!(persisted, Some(11));
}

#[test]
fn restart_resumes_from_handler_checkpoint() {
    let temp = tempdir().unwrap();
    {
        let store = MarkerStore::open(temp.path()).unwrap();
        let handler = MarkerHandler::new(store, MarkerConfig::default()).unwrap();
        for segment in 0..3 {
            handler.update_received_data(segment, 4);
            handler.update_sent_data(segment, 4);
        }
        handler.update_received_data(3, 4);
        handler.stop();
    }

    let store = MarkerStore::open(temp.path()).unwrap();
    assert_eq!(store.last_marked_segment(), Some(2));
}
