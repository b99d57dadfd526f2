//! Trace event source backed by the driver's device node.
//!
//! The driver streams fixed 24-byte event records through `read()` on the
//! control device. Polling with a timeout keeps the drain thread responsive
//! to shutdown even when no events arrive.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::path::Path;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::debug;

use crate::error::DiagError;
use crate::trace::event::{EventSource, Polled, TraceEvent};
use crate::wire::{self, EVENT_RECORD_LEN};

/// Reads trace event records from the inspector device.
pub struct DeviceEventSource {
    device: File,
    /// Bytes of a record split across reads.
    carry: Vec<u8>,
    /// Records parsed but not yet handed out.
    queue: VecDeque<TraceEvent>,
}

impl DeviceEventSource {
    /// Opens the trace stream. Fails with [`DiagError::TracingUnavailable`]
    /// when the device cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DiagError> {
        let device = File::open(path).map_err(DiagError::TracingUnavailable)?;
        debug!("opened trace device {}", path.display());
        Ok(Self {
            device,
            carry: Vec::new(),
            queue: VecDeque::new(),
        })
    }

    fn drain_carry(&mut self) {
        let full = self.carry.len() / EVENT_RECORD_LEN * EVENT_RECORD_LEN;
        for chunk in self.carry[..full].chunks_exact(EVENT_RECORD_LEN) {
            // Unknown record kinds are skipped, not stream failures.
            if let Some(event) = wire::parse_event_record(chunk) {
                self.queue.push_back(event);
            }
        }
        self.carry.drain(..full);
    }
}

impl EventSource for DeviceEventSource {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Polled> {
        if let Some(event) = self.queue.pop_front() {
            return Ok(Polled::Event(event));
        }

        let revents = {
            let timeout_ms = timeout.as_millis().min(u16::MAX as u128) as u16;
            let mut fds = [PollFd::new(self.device.as_fd(), PollFlags::POLLIN)];
            let ready = poll(&mut fds, PollTimeout::from(timeout_ms)).map_err(io::Error::from)?;
            if ready == 0 {
                return Ok(Polled::Idle);
            }
            fds[0].revents().unwrap_or(PollFlags::empty())
        };

        if !revents.contains(PollFlags::POLLIN) {
            // POLLHUP/POLLERR without data: the driver closed the stream.
            return Ok(Polled::Closed);
        }

        let mut buf = [0u8; 4096];
        let read = self.device.read(&mut buf)?;
        if read == 0 {
            return Ok(Polled::Closed);
        }

        self.carry.extend_from_slice(&buf[..read]);
        self.drain_carry();

        match self.queue.pop_front() {
            Some(event) => Ok(Polled::Event(event)),
            None => Ok(Polled::Idle),
        }
    }
}
