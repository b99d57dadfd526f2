//! Live accumulation of per-process virtual-memory trace events.
//!
//! A [`MemoryEventTracker`] drains a continuous event stream on a dedicated
//! background thread and maintains a concurrent per-process map of estimated
//! locked, large-page, and commit-delta bytes. Each process entry is replaced
//! wholesale on update, so readers never observe a partially written entry;
//! different processes update independently and never block each other.
//!
//! The totals are estimates, not exact ledgers: a free observed without its
//! matching allocation (the allocation predates the trace session) clamps to
//! zero rather than going negative, and a snapshot may miss events still in
//! flight.

pub mod device;
pub mod event;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use self::event::{EventSource, Polled, TraceEvent, TraceEventKind, MEM_LARGE_PAGES, MEM_PHYSICAL};

/// Entries untouched for this long are dropped before a snapshot is produced.
pub const STALE_AFTER_MINUTES: i64 = 5;

/// How long one poll of the event source may block; bounds how quickly the
/// drain thread notices shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Running estimate for one process. Immutable value; updates replace the
/// whole entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceProcessStats {
    pub locked_bytes_estimate: i64,
    pub large_page_bytes_estimate: i64,
    /// Signed commit delta; unlike the locked/large-page fields this may go
    /// negative within a cycle.
    pub commit_delta_bytes: i64,
    pub last_update: DateTime<Utc>,
}

/// Independently owned snapshot of the tracker state, keyed by process id.
pub type TraceSnapshot = AHashMap<u32, TraceProcessStats>;

/// Accumulates trace events into per-process running estimates.
pub struct MemoryEventTracker {
    stats: Arc<DashMap<u32, TraceProcessStats>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MemoryEventTracker {
    /// Starts draining `source` on a background thread. The thread lives for
    /// the tracker's lifetime; if the stream ends or fails, the tracker keeps
    /// serving its last state.
    pub fn start(mut source: Box<dyn EventSource>) -> Self {
        let stats: Arc<DashMap<u32, TraceProcessStats>> = Arc::new(DashMap::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker_stats = Arc::clone(&stats);
        let worker_stop = Arc::clone(&stop);
        let worker = thread::spawn(move || {
            debug!("trace drain thread started");
            loop {
                if worker_stop.load(Ordering::Relaxed) {
                    break;
                }
                match source.poll_event(POLL_INTERVAL) {
                    Ok(Polled::Event(event)) => apply_event(&worker_stats, &event),
                    Ok(Polled::Idle) => {}
                    Ok(Polled::Closed) => {
                        debug!("trace stream closed, keeping last accumulated state");
                        break;
                    }
                    Err(e) => {
                        warn!("trace stream terminated unexpectedly: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            stats,
            stop,
            worker: Some(worker),
        }
    }

    /// Prunes stale entries, then returns an independently owned copy of the
    /// current state. Consistent per entry, best-effort across the map.
    pub fn snapshot(&self) -> TraceSnapshot {
        let cutoff = Utc::now() - chrono::Duration::minutes(STALE_AFTER_MINUTES);
        prune_stale(&self.stats, cutoff);

        let mut out = TraceSnapshot::with_capacity(self.stats.len());
        for item in self.stats.iter() {
            out.insert(*item.key(), *item.value());
        }
        out
    }
}

impl Drop for MemoryEventTracker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            // Tolerates a drain thread that already exited with the stream.
            let _ = worker.join();
        }
    }
}

fn prune_stale(stats: &DashMap<u32, TraceProcessStats>, cutoff: DateTime<Utc>) {
    stats.retain(|_, entry| entry.last_update >= cutoff);
}

/// Applies one event to the per-process map. Each update replaces the entry
/// wholesale so concurrent readers see either the old or the new value.
fn apply_event(stats: &DashMap<u32, TraceProcessStats>, event: &TraceEvent) {
    match event.kind {
        TraceEventKind::VirtualAlloc => apply_sized(stats, event, 1),
        TraceEventKind::VirtualFree => apply_sized(stats, event, -1),
        TraceEventKind::ProcessStop => {
            stats.remove(&event.pid);
        }
    }
}

fn apply_sized(stats: &DashMap<u32, TraceProcessStats>, event: &TraceEvent, sign: i64) {
    // Absent or unreadable numeric fields degrade to a zero-size event.
    let size = sign * event.payload.int("size");
    let flags = event.payload.int("flags") as u32;

    let is_large_page = flags & MEM_LARGE_PAGES != 0;
    let affects_locked = is_large_page || flags & MEM_PHYSICAL != 0;
    let now = Utc::now();

    stats
        .entry(event.pid)
        .and_modify(|current| {
            *current = TraceProcessStats {
                locked_bytes_estimate: clamp_non_negative(
                    current.locked_bytes_estimate + if affects_locked { size } else { 0 },
                ),
                large_page_bytes_estimate: clamp_non_negative(
                    current.large_page_bytes_estimate + if is_large_page { size } else { 0 },
                ),
                commit_delta_bytes: current.commit_delta_bytes + size,
                last_update: now,
            };
        })
        .or_insert(TraceProcessStats {
            locked_bytes_estimate: clamp_non_negative(if affects_locked { size } else { 0 }),
            large_page_bytes_estimate: clamp_non_negative(if is_large_page { size } else { 0 }),
            commit_delta_bytes: size,
            last_update: now,
        });
}

/// Locked/large-page totals are estimates; underflow means the allocation was
/// observed before the session started, so the total floors at zero.
fn clamp_non_negative(value: i64) -> i64 {
    value.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(pid: u32, size: i64, flags: u32) -> TraceEvent {
        TraceEvent::sized(TraceEventKind::VirtualAlloc, pid, size, flags)
    }

    fn free(pid: u32, size: i64, flags: u32) -> TraceEvent {
        TraceEvent::sized(TraceEventKind::VirtualFree, pid, size, flags)
    }

    fn stats_for(map: &DashMap<u32, TraceProcessStats>, pid: u32) -> TraceProcessStats {
        *map.get(&pid).expect("entry should exist")
    }

    #[test]
    fn test_alloc_classification() {
        let map = DashMap::new();
        apply_event(&map, &alloc(1, 100, 0));
        apply_event(&map, &alloc(1, 200, MEM_PHYSICAL));
        apply_event(&map, &alloc(1, 400, MEM_LARGE_PAGES));

        let s = stats_for(&map, 1);
        assert_eq!(s.locked_bytes_estimate, 600);
        assert_eq!(s.large_page_bytes_estimate, 400);
        assert_eq!(s.commit_delta_bytes, 700);
    }

    #[test]
    fn test_matching_free_returns_totals_to_exactly_zero() {
        let map = DashMap::new();
        apply_event(&map, &alloc(7, 4096, MEM_LARGE_PAGES));
        apply_event(&map, &free(7, 4096, MEM_LARGE_PAGES));

        let s = stats_for(&map, 7);
        assert_eq!(s.locked_bytes_estimate, 0);
        assert_eq!(s.large_page_bytes_estimate, 0);
        assert_eq!(s.commit_delta_bytes, 0);
    }

    #[test]
    fn test_unmatched_free_clamps_to_zero_but_commit_goes_negative() {
        let map = DashMap::new();
        apply_event(&map, &free(9, 8192, MEM_PHYSICAL));

        let s = stats_for(&map, 9);
        assert_eq!(s.locked_bytes_estimate, 0);
        assert_eq!(s.large_page_bytes_estimate, 0);
        assert_eq!(s.commit_delta_bytes, -8192);
    }

    #[test]
    fn test_process_stop_removes_entry() {
        let map = DashMap::new();
        apply_event(&map, &alloc(3, 1024, MEM_PHYSICAL));
        assert!(map.contains_key(&3));

        apply_event(&map, &TraceEvent::process_stop(3));
        assert!(!map.contains_key(&3));
    }

    #[test]
    fn test_malformed_payload_degrades_to_zero_size() {
        let map = DashMap::new();
        let mut event = TraceEvent::process_stop(5);
        event.kind = TraceEventKind::VirtualAlloc; // no size/flags fields

        apply_event(&map, &event);
        let s = stats_for(&map, 5);
        assert_eq!(s.locked_bytes_estimate, 0);
        assert_eq!(s.large_page_bytes_estimate, 0);
        assert_eq!(s.commit_delta_bytes, 0);
    }

    #[test]
    fn test_processes_accumulate_independently() {
        let map = DashMap::new();
        apply_event(&map, &alloc(1, 100, MEM_PHYSICAL));
        apply_event(&map, &alloc(2, 200, MEM_LARGE_PAGES));

        assert_eq!(stats_for(&map, 1).locked_bytes_estimate, 100);
        assert_eq!(stats_for(&map, 2).large_page_bytes_estimate, 200);
    }

    #[test]
    fn test_prune_drops_only_stale_entries() {
        let map = DashMap::new();
        let now = Utc::now();
        map.insert(
            1,
            TraceProcessStats {
                locked_bytes_estimate: 10,
                large_page_bytes_estimate: 0,
                commit_delta_bytes: 10,
                last_update: now - chrono::Duration::minutes(STALE_AFTER_MINUTES + 1),
            },
        );
        map.insert(
            2,
            TraceProcessStats {
                locked_bytes_estimate: 20,
                large_page_bytes_estimate: 0,
                commit_delta_bytes: 20,
                last_update: now,
            },
        );

        prune_stale(&map, now - chrono::Duration::minutes(STALE_AFTER_MINUTES));
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));
    }
}
