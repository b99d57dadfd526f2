//! Error taxonomy for the diagnostics library.
//!
//! Summary-protocol failures are fatal to the collection cycle that hit them;
//! tracing failures degrade the cycle to summary-only analysis and are
//! handled at the collector boundary.

use std::io;

/// All failure kinds surfaced by the library.
#[derive(Debug, thiserror::Error)]
pub enum DiagError {
    /// The privileged control device could not be opened. Raised at client
    /// construction time, never per call.
    #[error("control device unavailable (is the sqlmem-inspector driver loaded?): {0}")]
    SourceUnavailable(#[source] io::Error),

    /// The control call itself failed for a reason other than a too-small
    /// output buffer.
    #[error("summary query failed: {0}")]
    Query(#[source] io::Error),

    /// The driver reported a summary version this client does not understand.
    #[error("incompatible driver summary version {0}")]
    IncompatibleVersion(u32),

    /// The driver returned fewer bytes than its own header demands. A partial
    /// response is never parsed as fewer processes.
    #[error("driver response truncated: got {got} bytes, expected at least {expected}")]
    TruncatedResponse { got: usize, expected: usize },

    /// The response was structurally malformed in some other way.
    #[error("malformed driver response: {0}")]
    Protocol(String),

    /// The live trace stream could not be started. Downgrades the run to
    /// summary-only analysis at the collector boundary.
    #[error("trace stream unavailable: {0}")]
    TracingUnavailable(#[source] io::Error),
}
