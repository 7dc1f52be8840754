// Integration tests for gapless playback scheduling
//
// The scheduler runs over a fake playback context whose clock the tests set by hand.

mod common;

use common::{DeviceLog, FakeContext};
use lex_live::audio::{PlaybackBuffer, PlaybackScheduler, PlaybackSignal};
use std::sync::Arc;

fn buffer(seconds: f64) -> PlaybackBuffer {
    let rate = 24000;
    PlaybackBuffer::new(vec![0.1; (seconds * rate as f64).round() as usize], rate)
}

fn scheduler() -> (PlaybackScheduler, Arc<DeviceLog>) {
    let log = Arc::new(DeviceLog::default());
    let context = FakeContext::new(Arc::clone(&log), 24000);
    (PlaybackScheduler::new(Box::new(context)), log)
}

#[test]
fn test_schedule_follows_arrival_order_not_decode_time() {
    let (mut scheduler, log) = scheduler();
    let t0 = 10.0;
    log.set_time(t0);

    // A (1.0s), B (0.5s), C (2.0s) handed over in arrival order; the clock moves while
    // they are decoded but stays inside A's playback
    let (a, _) = scheduler.schedule(buffer(1.0)).unwrap();
    log.set_time(t0 + 0.3);
    let (b, _) = scheduler.schedule(buffer(0.5)).unwrap();
    log.set_time(t0 + 0.35);
    let (c, _) = scheduler.schedule(buffer(2.0)).unwrap();

    assert!((a.start - t0).abs() < 1e-9);
    assert!((b.start - (t0 + 1.0)).abs() < 1e-9);
    assert!((c.start - (t0 + 1.5)).abs() < 1e-9);
    assert!((scheduler.next_start_time() - (t0 + 3.5)).abs() < 1e-9);
}

#[test]
fn test_late_buffer_starts_now() {
    let (mut scheduler, log) = scheduler();
    log.set_time(1.0);

    let (first, _) = scheduler.schedule(buffer(0.5)).unwrap();
    assert_eq!(first.end(), 1.5);

    // Arrives after the previous buffer finished: no backdating into the past
    log.set_time(4.0);
    let (second, _) = scheduler.schedule(buffer(0.5)).unwrap();
    assert_eq!(second.start, 4.0);
}

#[test]
fn test_starts_never_decrease_and_never_overlap() {
    let (mut scheduler, log) = scheduler();
    let arrivals = [
        (0.0, 0.4),
        (0.1, 0.2),
        (0.15, 1.3),
        (2.5, 0.05),
        (2.5, 0.7),
        (2.6, 0.01),
        (9.0, 0.3),
        (9.1, 0.3),
    ];

    let mut placed = Vec::new();
    for (now, seconds) in arrivals {
        log.set_time(now);
        let (scheduled, _) = scheduler.schedule(buffer(seconds)).unwrap();
        assert!(scheduled.start >= now, "never scheduled in the past");
        placed.push(scheduled);
    }

    for pair in placed.windows(2) {
        assert!(pair[1].start >= pair[0].start);
        assert!(pair[1].start >= pair[0].end() - 1e-9, "{:?} overlaps {:?}", pair[1], pair[0]);
    }
}

#[test]
fn test_started_and_drained_signals() {
    let (mut scheduler, _log) = scheduler();

    let (first, signal) = scheduler.schedule(buffer(0.2)).unwrap();
    assert_eq!(signal, Some(PlaybackSignal::Started));
    let (second, signal) = scheduler.schedule(buffer(0.2)).unwrap();
    assert_eq!(signal, None);
    assert_eq!(scheduler.active_count(), 2);

    assert_eq!(scheduler.on_ended(first.id), None);
    assert!(!scheduler.is_drained());
    assert_eq!(scheduler.on_ended(second.id), Some(PlaybackSignal::Drained));
    assert!(scheduler.is_drained());

    // Unknown or repeated completions are ignored
    assert_eq!(scheduler.on_ended(second.id), None);
    assert_eq!(scheduler.on_ended(99), None);
}

#[test]
fn test_stop_halts_everything_and_resets_cursor() {
    let (mut scheduler, log) = scheduler();
    scheduler.schedule(buffer(1.0)).unwrap();
    scheduler.schedule(buffer(1.0)).unwrap();

    log.set_time(0.4);
    scheduler.stop();

    let mut stopped = log.stopped_ids();
    stopped.sort_unstable();
    assert_eq!(stopped, vec![0, 1]);
    assert_eq!(scheduler.active_count(), 0);
    assert_eq!(scheduler.next_start_time(), 0.4);

    // Halted buffers never report completion
    assert_eq!(scheduler.on_ended(0), None);

    let (next, signal) = scheduler.schedule(buffer(0.1)).unwrap();
    assert_eq!(next.start, 0.4);
    assert_eq!(signal, Some(PlaybackSignal::Started));
}

#[test]
fn test_close_is_idempotent() {
    let (mut scheduler, log) = scheduler();
    scheduler.schedule(buffer(0.5)).unwrap();

    scheduler.close();
    scheduler.close();

    assert!(scheduler.is_closed());
    assert_eq!(log.contexts_open(), 0);
    assert_eq!(log.stopped_ids(), vec![0]);
    assert!(scheduler.schedule(buffer(0.5)).is_err());
}

#[test]
fn test_failed_start_leaves_cursor_alone() {
    let log = Arc::new(DeviceLog::default());
    let mut context = FakeContext::new(Arc::clone(&log), 24000);
    context.fail_start = true;
    let mut scheduler = PlaybackScheduler::new(Box::new(context));
    log.set_time(2.0);

    assert!(scheduler.schedule(buffer(1.0)).is_err());
    assert_eq!(scheduler.next_start_time(), 0.0);
    assert_eq!(scheduler.active_count(), 0);
}
