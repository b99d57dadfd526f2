//! The immutable per-cycle report handed to every external collaborator.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::analysis::DiagnosticFinding;
use crate::summary::MemorySummary;
use crate::trace::TraceSnapshot;

/// Everything one collection cycle produced. Exclusively owns its parts; no
/// shared mutable state crosses a report boundary.
#[derive(Debug, Clone)]
pub struct Report {
    /// Capture time, used by persistence collaborators as the storage key.
    pub captured_at: DateTime<Utc>,
    pub summary: MemorySummary,
    /// Ranked findings; empty means "no dominant culprit identified".
    pub findings: Vec<DiagnosticFinding>,
    /// Tracker snapshot used for analysis; empty when tracing is disabled.
    pub trace_stats: TraceSnapshot,
}

impl Report {
    /// Renders the external JSON contract.
    pub fn to_json(&self) -> Value {
        let summary = &self.summary;
        json!({
            "capturedAt": self.captured_at,
            "summary": {
                "totalPhysicalGiB": summary.total_physical_gib(),
                "availablePhysicalGiB": summary.available_physical_gib(),
                "kernelNonPagedGiB": summary.kernel_nonpaged_gib(),
                "kernelPagedGiB": summary.kernel_paged_gib(),
                "systemCacheGiB": summary.system_cache_gib(),
                "usesForensicPfns": summary.uses_forensic_pfns,
            },
            "processes": summary.processes.iter().map(|p| json!({
                "pid": p.pid,
                "imageName": p.image_name,
                "workingSetGiB": p.working_set_gib(),
                "privateGiB": p.private_gib(),
                "hiddenGiB": p.private_minus_working_set_gib(),
                "lockedGiB": p.locked_gib(),
                "largePageGiB": p.large_page_gib(),
                "isSqlServer": p.is_sql_server,
                "isVmHost": p.is_vm_host,
                "hasLockPagesPrivilege": p.has_lock_pages_privilege,
            })).collect::<Vec<_>>(),
            "findings": self.findings,
            "etw": self.trace_stats.iter()
                .map(|(pid, stats)| (pid.to_string(), stats))
                .collect::<std::collections::BTreeMap<_, _>>(),
        })
    }

    /// Pretty-printed JSON document.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
    }
}
