//! Simulated data sources for running the tool without the driver.
//!
//! Useful on development machines and in demos: the simulated channel encodes
//! a plausible summary through the real wire format, and the synthetic event
//! source feeds the tracker a steady mix of allocation traffic, so every
//! production code path past the device boundary is exercised.

use std::io;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::driver::{ChannelError, ControlChannel};
use crate::summary::{MemorySummary, ProcessEntry};
use crate::trace::event::{
    EventSource, Polled, TraceEvent, TraceEventKind, MEM_LARGE_PAGES, MEM_PHYSICAL,
};
use crate::wire::{self, SummaryHeader, ENTRY_LEN, HEADER_LEN, SUMMARY_VERSION};

const GIB: u64 = 1024 * 1024 * 1024;

/// Pid the synthetic SQL Server instance reports.
pub const SIM_SQL_PID: u32 = 1432;

/// Pid the synthetic VM host process reports.
pub const SIM_VM_PID: u32 = 2100;

/// Control channel that serves one randomly generated summary.
pub struct SimulatedControlChannel {
    summary: MemorySummary,
}

impl SimulatedControlChannel {
    /// Generates a host snapshot with a locked-pages-heavy SQL Server, a VM
    /// host process, and some background noise.
    pub fn new() -> Self {
        let mut rng = StdRng::from_entropy();

        let mut processes = vec![
            ProcessEntry {
                pid: SIM_SQL_PID,
                image_name: "sqlservr.exe".to_string(),
                working_set_bytes: rng.gen_range(18..=22) * GIB,
                private_bytes: rng.gen_range(30..=40) * GIB,
                locked_bytes: rng.gen_range(14..=18) * GIB,
                large_page_bytes: rng.gen_range(0..=2) * GIB,
                has_lock_pages_privilege: true,
                is_sql_server: true,
                is_vm_host: false,
                locked_bytes_exact: false,
                large_page_bytes_exact: false,
            },
            ProcessEntry {
                pid: SIM_VM_PID,
                image_name: "vmmem".to_string(),
                working_set_bytes: rng.gen_range(2..=6) * GIB,
                private_bytes: rng.gen_range(4..=8) * GIB,
                locked_bytes: 0,
                large_page_bytes: 0,
                has_lock_pages_privilege: false,
                is_sql_server: false,
                is_vm_host: true,
                locked_bytes_exact: true,
                large_page_bytes_exact: true,
            },
        ];

        for i in 0..rng.gen_range(10..30) {
            processes.push(ProcessEntry {
                pid: 3000 + i,
                image_name: format!("svchost-{}.exe", i),
                working_set_bytes: rng.gen_range(50..500) * 1024 * 1024,
                private_bytes: rng.gen_range(50..800) * 1024 * 1024,
                locked_bytes: 0,
                large_page_bytes: 0,
                has_lock_pages_privilege: false,
                is_sql_server: false,
                is_vm_host: false,
                locked_bytes_exact: true,
                large_page_bytes_exact: true,
            });
        }

        Self {
            summary: MemorySummary {
                version: SUMMARY_VERSION,
                total_phys_bytes: 64 * GIB,
                avail_phys_bytes: rng.gen_range(6..=12) * GIB,
                kernel_nonpaged_bytes: 2 * GIB,
                kernel_paged_bytes: GIB,
                system_cache_bytes: 4 * GIB,
                uses_forensic_pfns: false,
                processes,
            },
        }
    }
}

impl Default for SimulatedControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlChannel for SimulatedControlChannel {
    fn query_summary(&self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let needed = HEADER_LEN + self.summary.processes.len() * ENTRY_LEN;
        if buf.len() < needed {
            return Err(ChannelError::InsufficientBuffer);
        }

        let header = SummaryHeader {
            version: self.summary.version,
            process_count: self.summary.processes.len() as u32,
            total_phys_bytes: self.summary.total_phys_bytes,
            avail_phys_bytes: self.summary.avail_phys_bytes,
            kernel_nonpaged_bytes: self.summary.kernel_nonpaged_bytes,
            kernel_paged_bytes: self.summary.kernel_paged_bytes,
            system_cache_bytes: self.summary.system_cache_bytes,
            uses_forensic_pfns: self.summary.uses_forensic_pfns,
        };
        Ok(wire::encode_summary_into(&header, &self.summary.processes, buf))
    }
}

/// Event source emitting a randomized mix of allocation traffic for the
/// synthetic SQL Server and VM host pids.
pub struct SyntheticEventSource {
    rng: StdRng,
}

impl SyntheticEventSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SyntheticEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for SyntheticEventSource {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Polled> {
        thread::sleep(timeout.min(Duration::from_millis(5)));

        let pid = if self.rng.gen_bool(0.6) {
            SIM_SQL_PID
        } else {
            SIM_VM_PID
        };

        let kind = if self.rng.gen_bool(0.7) {
            TraceEventKind::VirtualAlloc
        } else {
            TraceEventKind::VirtualFree
        };

        let mut flags = 0u32;
        if pid == SIM_SQL_PID && self.rng.gen_bool(0.5) {
            flags |= MEM_PHYSICAL;
            if self.rng.gen_bool(0.3) {
                flags |= MEM_LARGE_PAGES;
            }
        }

        let size = self.rng.gen_range(1..=64) * 64 * 1024;
        Ok(Polled::Event(TraceEvent::sized(kind, pid, size, flags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SummaryClient;

    #[test]
    fn test_simulated_channel_round_trips_through_client() {
        let channel = SimulatedControlChannel::new();
        let expected = channel.summary.clone();

        let client = SummaryClient::new(Box::new(channel));
        let summary = client.get_summary().expect("simulated summary parses");

        assert_eq!(summary, expected);
        assert!(summary.processes.iter().any(|p| p.is_sql_server));
        assert!(summary.processes.iter().any(|p| p.is_vm_host));
    }
}
