//! End-to-end tests for the event tracker: a channel-backed source feeds the
//! background drain thread while snapshots are taken from the test thread.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use sqlmem_diag::trace::event::{
    EventSource, Polled, TraceEvent, TraceEventKind, MEM_LARGE_PAGES, MEM_PHYSICAL,
};
use sqlmem_diag::trace::{MemoryEventTracker, TraceSnapshot};

/// Event source fed from an mpsc channel; the stream closes when the sender
/// is dropped.
struct ChannelEventSource {
    rx: Receiver<TraceEvent>,
}

impl EventSource for ChannelEventSource {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Polled> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Polled::Event(event)),
            Err(RecvTimeoutError::Timeout) => Ok(Polled::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(Polled::Closed),
        }
    }
}

fn start_tracker() -> (MemoryEventTracker, Sender<TraceEvent>) {
    let (tx, rx) = mpsc::channel();
    let tracker = MemoryEventTracker::start(Box::new(ChannelEventSource { rx }));
    (tracker, tx)
}

/// Polls snapshots until the predicate holds or a 2 s deadline passes.
fn wait_for<F>(tracker: &MemoryEventTracker, mut predicate: F) -> TraceSnapshot
where
    F: FnMut(&TraceSnapshot) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = tracker.snapshot();
        if predicate(&snapshot) {
            return snapshot;
        }
        if Instant::now() > deadline {
            panic!("condition not reached within deadline; snapshot: {:?}", snapshot);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn alloc(pid: u32, size: i64, flags: u32) -> TraceEvent {
    TraceEvent::sized(TraceEventKind::VirtualAlloc, pid, size, flags)
}

fn free(pid: u32, size: i64, flags: u32) -> TraceEvent {
    TraceEvent::sized(TraceEventKind::VirtualFree, pid, size, flags)
}

#[test]
fn test_events_accumulate_into_snapshots() {
    let (tracker, tx) = start_tracker();

    tx.send(alloc(10, 4096, MEM_PHYSICAL)).expect("send");
    tx.send(alloc(10, 8192, MEM_LARGE_PAGES)).expect("send");
    tx.send(alloc(11, 1000, 0)).expect("send");

    let snapshot = wait_for(&tracker, |s| {
        s.get(&10).map(|e| e.locked_bytes_estimate == 12288).unwrap_or(false)
            && s.contains_key(&11)
    });

    let sql = snapshot[&10];
    assert_eq!(sql.large_page_bytes_estimate, 8192);
    assert_eq!(sql.commit_delta_bytes, 12288);

    let other = snapshot[&11];
    assert_eq!(other.locked_bytes_estimate, 0);
    assert_eq!(other.commit_delta_bytes, 1000);
}

#[test]
fn test_matching_free_returns_exactly_to_zero() {
    let (tracker, tx) = start_tracker();

    tx.send(alloc(20, 65536, MEM_PHYSICAL)).expect("send");
    tx.send(free(20, 65536, MEM_PHYSICAL)).expect("send");

    let snapshot = wait_for(&tracker, |s| {
        s.get(&20).map(|e| e.commit_delta_bytes == 0).unwrap_or(false)
    });
    assert_eq!(snapshot[&20].locked_bytes_estimate, 0);
    assert_eq!(snapshot[&20].large_page_bytes_estimate, 0);
}

#[test]
fn test_process_stop_removes_all_state() {
    let (tracker, tx) = start_tracker();

    tx.send(alloc(30, 4096, MEM_PHYSICAL)).expect("send");
    wait_for(&tracker, |s| s.contains_key(&30));

    tx.send(TraceEvent::process_stop(30)).expect("send");
    wait_for(&tracker, |s| !s.contains_key(&30));
}

#[test]
fn test_closed_stream_keeps_serving_last_snapshot() {
    let (tracker, tx) = start_tracker();

    tx.send(alloc(40, 2048, MEM_PHYSICAL)).expect("send");
    wait_for(&tracker, |s| s.contains_key(&40));

    // Dropping the sender ends the stream; the drain thread exits.
    drop(tx);
    thread::sleep(Duration::from_millis(300));

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot[&40].locked_bytes_estimate, 2048);
}

#[test]
fn test_drop_stops_tracker_with_live_stream() {
    let (tracker, tx) = start_tracker();
    tx.send(alloc(50, 1024, 0)).expect("send");
    wait_for(&tracker, |s| s.contains_key(&50));

    // Dropping while the sender is still alive must join promptly.
    drop(tracker);
}
