//! Binary layout of the driver's control responses and trace event records.
//!
//! All integers are little-endian. The summary response is a fixed-size
//! header followed by `process_count` fixed-size process records; trace
//! events are fixed 24-byte records read from the same device. Encoders are
//! provided so the simulator and tests feed the exact parse path the real
//! driver exercises.

use crate::error::DiagError;
use crate::summary::{ProcessEntry, UNNAMED_PROCESS};
use crate::trace::event::{EventPayload, TraceEvent, TraceEventKind};

/// Summary protocol version this client understands.
pub const SUMMARY_VERSION: u32 = 1;

/// Size of the summary header in bytes.
pub const HEADER_LEN: usize = 56;

/// Size of one process record in bytes.
pub const ENTRY_LEN: usize = 104;

/// Width of the fixed, NUL-padded image-name field inside a process record.
pub const IMAGE_NAME_LEN: usize = 64;

/// Size of one trace event record in bytes.
pub const EVENT_RECORD_LEN: usize = 24;

// Summary header flag bits.
pub const HDR_FLAG_FORENSIC_PFNS: u8 = 1 << 0;

// Process record flag bits.
pub const ENTRY_FLAG_LOCK_PAGES_PRIVILEGE: u8 = 1 << 0;
pub const ENTRY_FLAG_SQL_SERVER: u8 = 1 << 1;
pub const ENTRY_FLAG_VM_HOST: u8 = 1 << 2;
pub const ENTRY_FLAG_LOCKED_EXACT: u8 = 1 << 3;
pub const ENTRY_FLAG_LARGE_PAGE_EXACT: u8 = 1 << 4;

// Trace event record kinds.
pub const EVENT_KIND_ALLOC: u16 = 1;
pub const EVENT_KIND_FREE: u16 = 2;
pub const EVENT_KIND_PROCESS_STOP: u16 = 3;

/// Fixed-size summary header, as laid out by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryHeader {
    pub version: u32,
    pub process_count: u32,
    pub total_phys_bytes: u64,
    pub avail_phys_bytes: u64,
    pub kernel_nonpaged_bytes: u64,
    pub kernel_paged_bytes: u64,
    pub system_cache_bytes: u64,
    pub uses_forensic_pfns: bool,
}

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

#[inline]
fn read_i64(buf: &[u8], off: usize) -> i64 {
    read_u64(buf, off) as i64
}

#[inline]
fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

/// Parses the summary header from the start of a response buffer.
pub fn parse_header(buf: &[u8]) -> Result<SummaryHeader, DiagError> {
    if buf.len() < HEADER_LEN {
        return Err(DiagError::TruncatedResponse {
            got: buf.len(),
            expected: HEADER_LEN,
        });
    }

    Ok(SummaryHeader {
        version: read_u32(buf, 0),
        process_count: read_u32(buf, 4),
        total_phys_bytes: read_u64(buf, 8),
        avail_phys_bytes: read_u64(buf, 16),
        kernel_nonpaged_bytes: read_u64(buf, 24),
        kernel_paged_bytes: read_u64(buf, 32),
        system_cache_bytes: read_u64(buf, 40),
        uses_forensic_pfns: buf[48] & HDR_FLAG_FORENSIC_PFNS != 0,
    })
}

/// Parses one process record.
pub fn parse_entry(buf: &[u8]) -> Result<ProcessEntry, DiagError> {
    if buf.len() < ENTRY_LEN {
        return Err(DiagError::TruncatedResponse {
            got: buf.len(),
            expected: ENTRY_LEN,
        });
    }

    let flags = buf[100];
    Ok(ProcessEntry {
        pid: read_u32(buf, 0),
        image_name: decode_image_name(&buf[4..4 + IMAGE_NAME_LEN]),
        working_set_bytes: read_u64(buf, 68),
        private_bytes: read_u64(buf, 76),
        locked_bytes: read_u64(buf, 84),
        large_page_bytes: read_u64(buf, 92),
        has_lock_pages_privilege: flags & ENTRY_FLAG_LOCK_PAGES_PRIVILEGE != 0,
        is_sql_server: flags & ENTRY_FLAG_SQL_SERVER != 0,
        is_vm_host: flags & ENTRY_FLAG_VM_HOST != 0,
        locked_bytes_exact: flags & ENTRY_FLAG_LOCKED_EXACT != 0,
        large_page_bytes_exact: flags & ENTRY_FLAG_LARGE_PAGE_EXACT != 0,
    })
}

/// Decodes the fixed-width image-name field: trailing NUL padding and
/// whitespace are trimmed, an empty result renders as the placeholder.
fn decode_image_name(field: &[u8]) -> String {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let name = String::from_utf8_lossy(&field[..len]);
    let trimmed = name.trim();
    if trimmed.is_empty() {
        UNNAMED_PROCESS.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parses one trace event record. Returns `None` for unknown record kinds,
/// which are skipped rather than failing the stream.
pub fn parse_event_record(buf: &[u8]) -> Option<TraceEvent> {
    if buf.len() < EVENT_RECORD_LEN {
        return None;
    }

    let kind = match read_u16(buf, 0) {
        EVENT_KIND_ALLOC => TraceEventKind::VirtualAlloc,
        EVENT_KIND_FREE => TraceEventKind::VirtualFree,
        EVENT_KIND_PROCESS_STOP => TraceEventKind::ProcessStop,
        _ => return None,
    };

    let pid = read_u32(buf, 4);
    let mut payload = EventPayload::default();
    payload.set("size", read_i64(buf, 8));
    payload.set("flags", read_u32(buf, 16) as i64);

    Some(TraceEvent { kind, pid, payload })
}

/// Encodes a summary header. `process_count` is taken from the argument, not
/// from any entry slice, so tests can declare more processes than they encode.
pub fn encode_header(header: &SummaryHeader) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&header.version.to_le_bytes());
    buf[4..8].copy_from_slice(&header.process_count.to_le_bytes());
    buf[8..16].copy_from_slice(&header.total_phys_bytes.to_le_bytes());
    buf[16..24].copy_from_slice(&header.avail_phys_bytes.to_le_bytes());
    buf[24..32].copy_from_slice(&header.kernel_nonpaged_bytes.to_le_bytes());
    buf[32..40].copy_from_slice(&header.kernel_paged_bytes.to_le_bytes());
    buf[40..48].copy_from_slice(&header.system_cache_bytes.to_le_bytes());
    if header.uses_forensic_pfns {
        buf[48] |= HDR_FLAG_FORENSIC_PFNS;
    }
    buf
}

/// Encodes one process record.
pub fn encode_entry(entry: &ProcessEntry) -> [u8; ENTRY_LEN] {
    let mut buf = [0u8; ENTRY_LEN];
    buf[0..4].copy_from_slice(&entry.pid.to_le_bytes());

    let name = entry.image_name.as_bytes();
    let len = name.len().min(IMAGE_NAME_LEN - 1);
    buf[4..4 + len].copy_from_slice(&name[..len]);

    buf[68..76].copy_from_slice(&entry.working_set_bytes.to_le_bytes());
    buf[76..84].copy_from_slice(&entry.private_bytes.to_le_bytes());
    buf[84..92].copy_from_slice(&entry.locked_bytes.to_le_bytes());
    buf[92..100].copy_from_slice(&entry.large_page_bytes.to_le_bytes());

    let mut flags = 0u8;
    if entry.has_lock_pages_privilege {
        flags |= ENTRY_FLAG_LOCK_PAGES_PRIVILEGE;
    }
    if entry.is_sql_server {
        flags |= ENTRY_FLAG_SQL_SERVER;
    }
    if entry.is_vm_host {
        flags |= ENTRY_FLAG_VM_HOST;
    }
    if entry.locked_bytes_exact {
        flags |= ENTRY_FLAG_LOCKED_EXACT;
    }
    if entry.large_page_bytes_exact {
        flags |= ENTRY_FLAG_LARGE_PAGE_EXACT;
    }
    buf[100] = flags;
    buf
}

/// Encodes a full summary response (header + records) into `out`, returning
/// the number of bytes actually written. If `out` is too small the response
/// is truncated at `out.len()`, mirroring a driver that fills whatever
/// buffer it was handed.
pub fn encode_summary_into(header: &SummaryHeader, entries: &[ProcessEntry], out: &mut [u8]) -> usize {
    let mut written = 0;
    let hdr = encode_header(header);
    let n = hdr.len().min(out.len());
    out[..n].copy_from_slice(&hdr[..n]);
    written += hdr.len();

    for entry in entries {
        let rec = encode_entry(entry);
        if written < out.len() {
            let n = rec.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&rec[..n]);
        }
        written += rec.len();
    }
    written.min(out.len())
}

/// Encodes one trace event record.
pub fn encode_event_record(kind: u16, pid: u32, size: i64, flags: u32) -> [u8; EVENT_RECORD_LEN] {
    let mut buf = [0u8; EVENT_RECORD_LEN];
    buf[0..2].copy_from_slice(&kind.to_le_bytes());
    buf[4..8].copy_from_slice(&pid.to_le_bytes());
    buf[8..16].copy_from_slice(&size.to_le_bytes());
    buf[16..20].copy_from_slice(&flags.to_le_bytes());
    buf
}
