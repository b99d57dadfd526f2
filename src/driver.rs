//! Summary protocol client for the sqlmem-inspector control device.
//!
//! The device is opened once at construction; `get_summary` issues the
//! get-summary control call with an output buffer sized for a header plus a
//! growable number of process-record slots, doubling the capacity until the
//! driver's process list fits. Every attempt is idempotent and side-effect
//! free on the driver.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::errno::Errno;
use tracing::debug;

use crate::error::DiagError;
use crate::summary::MemorySummary;
use crate::wire::{self, ENTRY_LEN, HEADER_LEN, SUMMARY_VERSION};

/// Default path of the inspector's control device.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/sqlmem-inspector";

/// Process-record slots allocated for the first attempt.
pub const INITIAL_PROCESS_CAPACITY: usize = 512;

/// Request block handed to the get-summary ioctl. The driver fills `buffer`
/// and reports the byte count in `bytes_returned`.
#[repr(C)]
pub struct SummaryRequest {
    pub buffer: *mut u8,
    pub capacity: u64,
    pub bytes_returned: u64,
}

nix::ioctl_readwrite!(sqlmem_get_summary, b'M', 0x01, SummaryRequest);

/// Transport errors a control channel can report for one query attempt.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The output buffer was too small for the driver's process list.
    #[error("output buffer too small for the driver's process list")]
    InsufficientBuffer,

    /// The control call failed outright.
    #[error("control call failed: {0}")]
    Io(#[source] io::Error),
}

/// One control operation against the privileged source: fill `buf` with the
/// summary response and return the byte count actually written.
pub trait ControlChannel: Send + Sync {
    fn query_summary(&self, buf: &mut [u8]) -> Result<usize, ChannelError>;
}

/// Control channel backed by an ioctl on the inspector device node.
pub struct DeviceControlChannel {
    device: File,
}

impl DeviceControlChannel {
    /// Opens the control device, failing fast with
    /// [`DiagError::SourceUnavailable`] when the driver is absent.
    pub fn open(path: &Path) -> Result<Self, DiagError> {
        let device = File::open(path).map_err(DiagError::SourceUnavailable)?;
        debug!("opened control device {}", path.display());
        Ok(Self { device })
    }
}

impl ControlChannel for DeviceControlChannel {
    fn query_summary(&self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        let mut request = SummaryRequest {
            buffer: buf.as_mut_ptr(),
            capacity: buf.len() as u64,
            bytes_returned: 0,
        };

        // The request block points into `buf`, which outlives the call.
        let result = unsafe { sqlmem_get_summary(self.device.as_raw_fd(), &mut request) };
        match result {
            Ok(_) => Ok(request.bytes_returned as usize),
            Err(Errno::ENOSPC) => Err(ChannelError::InsufficientBuffer),
            Err(errno) => Err(ChannelError::Io(io::Error::from(errno))),
        }
    }
}

/// Parses driver summaries out of a control channel.
pub struct SummaryClient {
    channel: Box<dyn ControlChannel>,
}

impl SummaryClient {
    pub fn new(channel: Box<dyn ControlChannel>) -> Self {
        Self { channel }
    }

    /// Opens the control device at `path` and wraps it in a client.
    pub fn open_device(path: &Path) -> Result<Self, DiagError> {
        Ok(Self::new(Box::new(DeviceControlChannel::open(path)?)))
    }

    /// Queries one point-in-time summary from the driver.
    ///
    /// Grows the output buffer until the driver's process list fits; a
    /// response shorter than its own header demands fails with
    /// [`DiagError::TruncatedResponse`] rather than parsing fewer processes.
    pub fn get_summary(&self) -> Result<MemorySummary, DiagError> {
        let mut capacity = INITIAL_PROCESS_CAPACITY;

        loop {
            let mut buf = vec![0u8; HEADER_LEN + capacity * ENTRY_LEN];
            let returned = match self.channel.query_summary(&mut buf) {
                Ok(n) => n,
                Err(ChannelError::InsufficientBuffer) => {
                    capacity = capacity.saturating_mul(2);
                    debug!("driver reported insufficient buffer, growing to {} slots", capacity);
                    continue;
                }
                Err(ChannelError::Io(e)) => return Err(DiagError::Query(e)),
            };

            // A byte count beyond the buffer we handed out is a driver bug,
            // not a capacity miss.
            if returned > buf.len() {
                return Err(DiagError::Protocol(format!(
                    "driver reported {} bytes in a {}-byte buffer",
                    returned,
                    buf.len()
                )));
            }

            if returned < HEADER_LEN {
                return Err(DiagError::TruncatedResponse {
                    got: returned,
                    expected: HEADER_LEN,
                });
            }

            let header = wire::parse_header(&buf[..returned])?;
            if header.version != SUMMARY_VERSION {
                return Err(DiagError::IncompatibleVersion(header.version));
            }

            let declared = header.process_count as usize;
            if declared > capacity {
                // Capacity miss: the header itself still fit, so grow to at
                // least the declared count and retry.
                capacity = declared.max(capacity.saturating_mul(2));
                debug!("driver declared {} processes, growing to {} slots", declared, capacity);
                continue;
            }

            let mut processes = Vec::with_capacity(declared);
            if declared > 0 {
                let expected = HEADER_LEN + declared * ENTRY_LEN;
                if returned < expected {
                    return Err(DiagError::TruncatedResponse {
                        got: returned,
                        expected,
                    });
                }

                for i in 0..declared {
                    let start = HEADER_LEN + i * ENTRY_LEN;
                    processes.push(wire::parse_entry(&buf[start..start + ENTRY_LEN])?);
                }
            }

            return Ok(MemorySummary {
                version: header.version,
                total_phys_bytes: header.total_phys_bytes,
                avail_phys_bytes: header.avail_phys_bytes,
                kernel_nonpaged_bytes: header.kernel_nonpaged_bytes,
                kernel_paged_bytes: header.kernel_paged_bytes,
                system_cache_bytes: header.system_cache_bytes,
                uses_forensic_pfns: header.uses_forensic_pfns,
                processes,
            });
        }
    }
}
