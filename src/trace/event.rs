//! Boundary types for the live virtual-memory trace stream.
//!
//! Events carry a loosely typed payload whose fields are read by name and
//! degrade to zero when absent or non-numeric, so a malformed event becomes a
//! zero-size no-op instead of failing the stream.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use serde_json::Value;

/// Allocation-type flag: the allocation is backed by pinned physical pages.
pub const MEM_PHYSICAL: u32 = 0x0040_0000;

/// Allocation-type flag: the allocation is backed by large pages.
pub const MEM_LARGE_PAGES: u32 = 0x2000_0000;

/// The three event kinds the accumulator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEventKind {
    VirtualAlloc,
    VirtualFree,
    ProcessStop,
}

/// Loosely typed payload attached to a trace event.
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    fields: HashMap<String, Value>,
}

impl EventPayload {
    /// Sets a named field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Reads a named integer field. Absent or non-numeric fields read as 0.
    pub fn int(&self, name: &str) -> i64 {
        self.fields.get(name).and_then(Value::as_i64).unwrap_or(0)
    }
}

/// One event from the trace stream.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    /// Process the event belongs to.
    pub pid: u32,
    pub payload: EventPayload,
}

impl TraceEvent {
    /// Convenience constructor for alloc/free events.
    pub fn sized(kind: TraceEventKind, pid: u32, size: i64, flags: u32) -> Self {
        let mut payload = EventPayload::default();
        payload.set("size", size);
        payload.set("flags", flags as i64);
        Self { kind, pid, payload }
    }

    /// Convenience constructor for process-stop events.
    pub fn process_stop(pid: u32) -> Self {
        Self {
            kind: TraceEventKind::ProcessStop,
            pid,
            payload: EventPayload::default(),
        }
    }
}

/// Result of polling an event source once.
#[derive(Debug)]
pub enum Polled {
    /// One event was delivered.
    Event(TraceEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The stream has ended; no further events will arrive.
    Closed,
}

/// A continuous source of trace events, drained by the tracker's background
/// thread. Implementations must return within roughly `timeout` so the drain
/// loop can observe shutdown between polls.
pub trait EventSource: Send {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Polled>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_absent_field_reads_zero() {
        let payload = EventPayload::default();
        assert_eq!(payload.int("size"), 0);
        assert_eq!(payload.int("flags"), 0);
    }

    #[test]
    fn test_payload_non_numeric_field_reads_zero() {
        let mut payload = EventPayload::default();
        payload.set("size", "not-a-number");
        assert_eq!(payload.int("size"), 0);
    }

    #[test]
    fn test_payload_named_reads() {
        let mut payload = EventPayload::default();
        payload.set("size", 65536i64);
        payload.set("flags", MEM_LARGE_PAGES as i64);
        assert_eq!(payload.int("size"), 65536);
        assert_eq!(payload.int("flags") as u32, MEM_LARGE_PAGES);
    }
}
