//! Heuristic analysis of one summary/tracker snapshot pair.
//!
//! [`analyze`] is a pure, total function: any well-formed summary and
//! snapshot, including empty ones, yields a (possibly empty) list of
//! findings. An empty list means "no dominant culprit identified", not an
//! error.

use serde::Serialize;

use crate::summary::{bytes_to_gib, MemorySummary};
use crate::trace::TraceSnapshot;

/// Unattributed physical memory floor, in GiB, for the `GAP` finding.
pub const HIDDEN_GAP_GIB_THRESHOLD: f64 = 2.0;

/// Locked-memory share of total physical that flags SQL Server.
pub const SQL_LOCKED_FRACTION_THRESHOLD: f64 = 0.20;

/// Private-minus-working-set floor, in GiB, that flags SQL Server commit.
pub const SQL_COMMIT_EXCESS_GIB_THRESHOLD: f64 = 8.0;

/// Private-memory share of total physical that flags the VM host process.
pub const VM_HOST_DOMINANCE_FRACTION: f64 = 0.30;

/// Stable identifiers for the finding vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingId {
    /// SQL Server holds a dominant share of locked or large-page memory.
    #[serde(rename = "SQL-LPIM")]
    SqlLockedPages,
    /// SQL Server's private commit greatly exceeds its working set.
    #[serde(rename = "SQL-COMMIT")]
    SqlCommitExcess,
    /// The virtualization host process dominates physical memory.
    #[serde(rename = "WSL2")]
    VmHostDominance,
    /// Fallback: a large unattributed gap with no named culprit.
    #[serde(rename = "GAP")]
    HiddenGap,
}

impl FindingId {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingId::SqlLockedPages => "SQL-LPIM",
            FindingId::SqlCommitExcess => "SQL-COMMIT",
            FindingId::VmHostDominance => "WSL2",
            FindingId::HiddenGap => "GAP",
        }
    }
}

/// One diagnostic finding, produced fresh each cycle and never updated in
/// place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticFinding {
    pub id: FindingId,
    pub title: String,
    pub description: String,
    /// Severity score in [0, 1].
    pub severity: f64,
}

/// Fuses one summary with one tracker snapshot into ranked findings.
///
/// The tracker's live estimate can only raise, never lower, the summary's
/// reported locked figure. `GAP` fires only when nothing else did.
pub fn analyze(summary: &MemorySummary, trace: &TraceSnapshot) -> Vec<DiagnosticFinding> {
    let mut findings = Vec::new();

    let total_physical_gib = summary.total_physical_gib();
    let in_use_gib = total_physical_gib - summary.available_physical_gib();
    let working_set_gib: f64 = summary.processes.iter().map(|p| p.working_set_gib()).sum();
    let hidden_gap_gib = (in_use_gib - working_set_gib).max(0.0);

    // At most one of each is expected; first match in input order wins when
    // the driver reports several.
    let sql = summary.processes.iter().find(|p| p.is_sql_server);
    let vm_host = summary.processes.iter().find(|p| p.is_vm_host);

    if let Some(sql) = sql {
        let mut locked_estimate_gib = sql.locked_gib() + sql.large_page_gib();
        if let Some(stats) = trace.get(&sql.pid) {
            let live = stats.locked_bytes_estimate + stats.large_page_bytes_estimate;
            locked_estimate_gib = locked_estimate_gib.max(bytes_to_gib(live.max(0) as u64));
        }

        if locked_estimate_gib >= total_physical_gib * SQL_LOCKED_FRACTION_THRESHOLD {
            findings.push(DiagnosticFinding {
                id: FindingId::SqlLockedPages,
                title: "SQL Server locked or large-page memory".to_string(),
                description: format!(
                    "{} PID {} is estimated to hold {:.1} GiB in locked or large pages.",
                    sql.image_name, sql.pid, locked_estimate_gib
                ),
                severity: 1.0,
            });
        }

        if sql.private_minus_working_set_gib() >= SQL_COMMIT_EXCESS_GIB_THRESHOLD {
            findings.push(DiagnosticFinding {
                id: FindingId::SqlCommitExcess,
                title: "SQL Server private commit greatly exceeds working set".to_string(),
                description: format!(
                    "{} PID {} has {:.1} GiB of private commit beyond its working set, \
                     indicating hidden locked memory or large pages.",
                    sql.image_name,
                    sql.pid,
                    sql.private_minus_working_set_gib()
                ),
                severity: 0.7,
            });
        }
    }

    if let Some(vm_host) = vm_host {
        if vm_host.private_gib() >= total_physical_gib * VM_HOST_DOMINANCE_FRACTION {
            findings.push(DiagnosticFinding {
                id: FindingId::VmHostDominance,
                title: "WSL2/Hyper-V memory pressure".to_string(),
                description: format!(
                    "{} PID {} is consuming {:.1} GiB, a dominant share of physical memory.",
                    vm_host.image_name,
                    vm_host.pid,
                    vm_host.private_gib()
                ),
                severity: 0.9,
            });
        }
    }

    if findings.is_empty() && hidden_gap_gib >= HIDDEN_GAP_GIB_THRESHOLD {
        findings.push(DiagnosticFinding {
            id: FindingId::HiddenGap,
            title: "Large gap between physical usage and working sets".to_string(),
            description: format!(
                "Approximately {:.1} GiB of physical memory is unaccounted for by working \
                 sets. Inspect kernel pools or driver allocations.",
                hidden_gap_gib
            ),
            severity: 0.5,
        });
    }

    findings
}
