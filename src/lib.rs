//! SQL Server Hidden-Memory Diagnostics Library
//!
//! This library answers one question: where did the physical memory on a SQL
//! Server host go? It combines a point-in-time summary queried from a
//! privileged kernel driver with a live accumulation of virtual-memory
//! allocation/free trace events, then applies a fixed set of heuristics to
//! name the likely culprit (locked/large-page memory, a virtualization host
//! process, or unattributed kernel consumption).
//!
//! # Components
//!
//! - **Summary client** ([`driver::SummaryClient`]): queries a versioned
//!   binary summary plus per-process records over the driver's control
//!   channel, growing the response buffer until the driver's process list fits.
//! - **Event tracker** ([`trace::MemoryEventTracker`]): drains a continuous
//!   trace stream on a background thread and keeps a concurrent per-process
//!   running estimate of locked/large-page/commit-delta bytes.
//! - **Analyzer** ([`analysis::analyze`]): fuses one summary snapshot with one
//!   tracker snapshot into zero or more ranked [`analysis::DiagnosticFinding`]s.
//! - **Collector** ([`collect::MemoryCollector`]): sequences one collection
//!   cycle and returns a [`report::Report`].
//!
//! # Usage
//!
//! ```no_run
//! use sqlmem_diag::collect::{CollectorOptions, MemoryCollector};
//! use sqlmem_diag::driver::SummaryClient;
//! use sqlmem_diag::trace::device::DeviceEventSource;
//! use sqlmem_diag::trace::event::EventSource;
//! use std::path::PathBuf;
//!
//! # async fn run() -> Result<(), sqlmem_diag::error::DiagError> {
//! let device = PathBuf::from("/dev/sqlmem-inspector");
//! let client = SummaryClient::open_device(&device)?;
//! let trace_device = device.clone();
//! let collector = MemoryCollector::new(
//!     client,
//!     Box::new(move || {
//!         DeviceEventSource::open(&trace_device).map(|s| Box::new(s) as Box<dyn EventSource>)
//!     }),
//!     CollectorOptions::default(),
//! );
//!
//! let report = collector.capture_snapshot().await?;
//! for finding in &report.findings {
//!     println!("[{}] {}", finding.id.as_str(), finding.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod collect;
pub mod driver;
pub mod error;
pub mod report;
pub mod sim;
pub mod summary;
pub mod trace;
pub mod wire;

// Re-export main types for convenience
pub use analysis::{DiagnosticFinding, FindingId};
pub use collect::{CollectorOptions, MemoryCollector};
pub use driver::SummaryClient;
pub use error::DiagError;
pub use report::Report;
pub use summary::{MemorySummary, ProcessEntry};
pub use trace::{MemoryEventTracker, TraceProcessStats, TraceSnapshot};
