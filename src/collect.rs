//! Collection orchestrator: sequences one diagnostic cycle.
//!
//! The collector owns the event tracker's lifetime. The first cycle starts
//! it (unless disabled) and waits a short settling delay so a few events
//! accumulate; later cycles skip the delay. Each cycle fetches a summary,
//! snapshots the tracker, runs the analyzer, and returns one [`Report`].
//!
//! Cancellation is future-drop: dropping the `capture_snapshot` future aborts
//! the settle delay and the fetch await, and never yields a partial report.
//! The background drain thread is scoped to the tracker, not to any cycle.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::analysis;
use crate::driver::SummaryClient;
use crate::error::DiagError;
use crate::report::Report;
use crate::trace::event::EventSource;
use crate::trace::MemoryEventTracker;

/// Delay after the tracker first starts, before the first snapshot.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Builds the event source the tracker will drain. Invoked once, on the
/// first collection cycle.
pub type EventSourceFactory =
    Box<dyn Fn() -> Result<Box<dyn EventSource>, DiagError> + Send + Sync>;

/// Collector configuration from the orchestration collaborator.
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Whether live event tracking is enabled at all.
    pub enable_event_tracing: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            enable_event_tracing: true,
        }
    }
}

/// Composition root for one host's diagnostics. Cheap to share: concurrent
/// cycles may call [`capture_snapshot`](Self::capture_snapshot) in parallel,
/// each with its own request buffer.
pub struct MemoryCollector {
    client: Arc<SummaryClient>,
    source_factory: EventSourceFactory,
    options: CollectorOptions,
    tracker: OnceCell<Option<MemoryEventTracker>>,
    settled: AtomicBool,
}

impl MemoryCollector {
    pub fn new(
        client: SummaryClient,
        source_factory: EventSourceFactory,
        options: CollectorOptions,
    ) -> Self {
        Self {
            client: Arc::new(client),
            source_factory,
            options,
            tracker: OnceCell::new(),
            settled: AtomicBool::new(false),
        }
    }

    /// Runs one collection cycle and returns its report.
    ///
    /// A failed summary fetch fails the whole cycle; a tracker that never
    /// started degrades the cycle to summary-only analysis with an empty
    /// snapshot.
    pub async fn capture_snapshot(&self) -> Result<Report, DiagError> {
        let tracker = self.tracker.get_or_init(|| self.start_tracker());

        if tracker.is_some() && !self.settled.load(Ordering::SeqCst) {
            // Let the freshly started stream accumulate a few events. The
            // flag flips only after a full delay, so a cycle dropped
            // mid-sleep leaves the next one to settle again.
            tokio::time::sleep(SETTLE_DELAY).await;
            self.settled.store(true, Ordering::SeqCst);
        }

        let client = Arc::clone(&self.client);
        let summary = tokio::task::spawn_blocking(move || client.get_summary())
            .await
            .map_err(|e| DiagError::Query(io::Error::new(io::ErrorKind::Other, e)))??;

        let trace_stats = tracker.as_ref().map(|t| t.snapshot()).unwrap_or_default();
        let findings = analysis::analyze(&summary, &trace_stats);

        Ok(Report {
            captured_at: Utc::now(),
            summary,
            findings,
            trace_stats,
        })
    }

    /// Whether the live tracker is running for this collector.
    pub fn tracing_active(&self) -> bool {
        matches!(self.tracker.get(), Some(Some(_)))
    }

    fn start_tracker(&self) -> Option<MemoryEventTracker> {
        if !self.options.enable_event_tracing {
            debug!("live event tracking disabled by configuration");
            return None;
        }

        match (self.source_factory)() {
            Ok(source) => Some(MemoryEventTracker::start(source)),
            Err(e) => {
                warn!(
                    "failed to start trace stream, continuing with summary-only analysis: {}",
                    e
                );
                None
            }
        }
    }
}
