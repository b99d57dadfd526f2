//! Integration tests for the heuristic analyzer.
//!
//! These exercise the finding vocabulary end to end: threshold crossings,
//! the fallback-only GAP finding, and the monotone effect of the live
//! accumulator estimate.

use chrono::Utc;
use sqlmem_diag::analysis::{analyze, FindingId};
use sqlmem_diag::summary::{MemorySummary, ProcessEntry};
use sqlmem_diag::trace::{TraceProcessStats, TraceSnapshot};

const GIB: u64 = 1024 * 1024 * 1024;

fn build_summary(total: u64, avail: u64, processes: Vec<ProcessEntry>) -> MemorySummary {
    MemorySummary {
        version: 1,
        total_phys_bytes: total,
        avail_phys_bytes: avail,
        kernel_nonpaged_bytes: 2 * GIB,
        kernel_paged_bytes: GIB,
        system_cache_bytes: 4 * GIB,
        uses_forensic_pfns: false,
        processes,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_process(
    pid: u32,
    name: &str,
    working_set: u64,
    private: u64,
    locked: u64,
    large_page: u64,
    is_sql: bool,
    is_vm: bool,
) -> ProcessEntry {
    ProcessEntry {
        pid,
        image_name: name.to_string(),
        working_set_bytes: working_set,
        private_bytes: private,
        locked_bytes: locked,
        large_page_bytes: large_page,
        has_lock_pages_privilege: is_sql,
        is_sql_server: is_sql,
        is_vm_host: is_vm,
        locked_bytes_exact: true,
        large_page_bytes_exact: true,
    }
}

fn trace_entry(locked: i64, large: i64) -> TraceProcessStats {
    TraceProcessStats {
        locked_bytes_estimate: locked,
        large_page_bytes_estimate: large,
        commit_delta_bytes: locked + large,
        last_update: Utc::now(),
    }
}

fn ids(findings: &[sqlmem_diag::DiagnosticFinding]) -> Vec<FindingId> {
    findings.iter().map(|f| f.id).collect()
}

#[test]
fn test_sql_locked_memory_fires_lpim_and_commit() {
    // 128 GiB host, sqlservr holds 50+10 GiB locked/large and 60 GiB of
    // private commit beyond its working set.
    let summary = build_summary(
        128 * GIB,
        10 * GIB,
        vec![build_process(
            100,
            "sqlservr.exe",
            20 * GIB,
            80 * GIB,
            50 * GIB,
            10 * GIB,
            true,
            false,
        )],
    );

    let findings = analyze(&summary, &TraceSnapshot::default());
    let ids = ids(&findings);
    assert!(ids.contains(&FindingId::SqlLockedPages));
    assert!(ids.contains(&FindingId::SqlCommitExcess));
    assert!(!ids.contains(&FindingId::HiddenGap));

    let lpim = findings
        .iter()
        .find(|f| f.id == FindingId::SqlLockedPages)
        .expect("lpim");
    assert_eq!(lpim.severity, 1.0);
    assert!(lpim.description.contains("60.0 GiB"));
}

#[test]
fn test_hidden_gap_fires_only_without_named_culprit() {
    // (64-8) - 10 = 46 GiB unattributed, nothing else to blame.
    let summary = build_summary(
        64 * GIB,
        8 * GIB,
        vec![build_process(
            200,
            "other.exe",
            10 * GIB,
            12 * GIB,
            0,
            0,
            false,
            false,
        )],
    );

    let findings = analyze(&summary, &TraceSnapshot::default());
    assert_eq!(ids(&findings), vec![FindingId::HiddenGap]);
    assert_eq!(findings[0].severity, 0.5);
}

#[test]
fn test_vm_host_dominance_fires_wsl2() {
    let summary = build_summary(
        64 * GIB,
        12 * GIB,
        vec![build_process(
            300,
            "vmmem",
            18 * GIB,
            30 * GIB,
            0,
            0,
            false,
            true,
        )],
    );

    let findings = analyze(&summary, &TraceSnapshot::default());
    assert!(ids(&findings).contains(&FindingId::VmHostDominance));
    assert!(!ids(&findings).contains(&FindingId::HiddenGap));
}

#[test]
fn test_gap_never_co_occurs_with_named_findings() {
    // Huge hidden gap AND a flagged SQL process: the gap finding must yield.
    let summary = build_summary(
        128 * GIB,
        4 * GIB,
        vec![build_process(
            100,
            "sqlservr.exe",
            10 * GIB,
            80 * GIB,
            60 * GIB,
            0,
            true,
            false,
        )],
    );

    let findings = analyze(&summary, &TraceSnapshot::default());
    assert!(ids(&findings).contains(&FindingId::SqlLockedPages));
    assert!(!ids(&findings).contains(&FindingId::HiddenGap));
}

#[test]
fn test_accumulator_estimate_raises_but_never_lowers() {
    // Summary alone reports too little locked memory to flag SQL.
    let summary = build_summary(
        128 * GIB,
        60 * GIB,
        vec![build_process(
            100,
            "sqlservr.exe",
            20 * GIB,
            24 * GIB,
            4 * GIB,
            0,
            true,
            false,
        )],
    );

    let without = analyze(&summary, &TraceSnapshot::default());
    assert!(!ids(&without).contains(&FindingId::SqlLockedPages));

    // Live estimate above the 20% threshold creates the finding.
    let mut raised = TraceSnapshot::default();
    raised.insert(100, trace_entry(30 * GIB as i64, 0));
    let with = analyze(&summary, &raised);
    assert!(ids(&with).contains(&FindingId::SqlLockedPages));

    // Raising the accumulator further can only preserve it.
    let mut higher = TraceSnapshot::default();
    higher.insert(100, trace_entry(50 * GIB as i64, 10 * GIB as i64));
    let still = analyze(&summary, &higher);
    assert!(ids(&still).contains(&FindingId::SqlLockedPages));

    // A small accumulator value never lowers the summary's own figure.
    let mut tiny = TraceSnapshot::default();
    tiny.insert(100, trace_entry(1, 0));
    let summary_heavy = build_summary(
        128 * GIB,
        60 * GIB,
        vec![build_process(
            100,
            "sqlservr.exe",
            20 * GIB,
            24 * GIB,
            40 * GIB,
            0,
            true,
            false,
        )],
    );
    let kept = analyze(&summary_heavy, &tiny);
    assert!(ids(&kept).contains(&FindingId::SqlLockedPages));
}

#[test]
fn test_analyze_is_idempotent() {
    let summary = build_summary(
        128 * GIB,
        10 * GIB,
        vec![
            build_process(100, "sqlservr.exe", 20 * GIB, 80 * GIB, 50 * GIB, 10 * GIB, true, false),
            build_process(300, "vmmem", 18 * GIB, 48 * GIB, 0, 0, false, true),
        ],
    );
    let mut trace = TraceSnapshot::default();
    trace.insert(100, trace_entry(GIB as i64, 0));

    let first = analyze(&summary, &trace);
    let second = analyze(&summary, &trace);
    assert_eq!(first, second);
}

#[test]
fn test_no_findings_on_healthy_host() {
    // 21 GiB in use against 20 GiB of working sets: a 1 GiB gap stays under
    // the unattributed-memory floor.
    let summary = build_summary(
        64 * GIB,
        43 * GIB,
        vec![build_process(
            500,
            "app.exe",
            20 * GIB,
            22 * GIB,
            0,
            0,
            false,
            false,
        )],
    );
    assert!(analyze(&summary, &TraceSnapshot::default()).is_empty());
}
