//! Human-readable text rendering of a report.

use std::cmp::Ordering;

use sqlmem_diag::report::Report;

/// Processes shown in the top consumers table.
const TOP_PROCESSES: usize = 10;

/// Prints the report to stdout.
pub fn print_report(report: &Report) {
    let summary = &report.summary;

    println!("Total Physical: {:.1} GiB", summary.total_physical_gib());
    println!("Available     : {:.1} GiB", summary.available_physical_gib());
    println!(
        "Kernel NP/P   : {:.1} / {:.1} GiB",
        summary.kernel_nonpaged_gib(),
        summary.kernel_paged_gib()
    );
    println!("System Cache  : {:.1} GiB", summary.system_cache_gib());
    if summary.uses_forensic_pfns {
        println!("Method        : forensic PFN scan (exact locked/large-page counts)");
    }
    println!();

    println!("Top processes:");
    let mut processes: Vec<_> = summary.processes.iter().collect();
    processes.sort_by(|a, b| b.private_bytes.cmp(&a.private_bytes));
    for process in processes.iter().take(TOP_PROCESSES) {
        println!(
            " - {} (PID {}) WS={:.1} GiB Private={:.1} GiB Hidden={:.1} GiB",
            process.image_name,
            process.pid,
            process.working_set_gib(),
            process.private_gib(),
            process.private_minus_working_set_gib()
        );
    }
    println!();

    println!("Findings:");
    if report.findings.is_empty() {
        println!(" - No dominant culprit detected. Inspect driver/pool consumers.");
    } else {
        let mut findings: Vec<_> = report.findings.iter().collect();
        findings.sort_by(|a, b| {
            b.severity
                .partial_cmp(&a.severity)
                .unwrap_or(Ordering::Equal)
        });
        for finding in findings {
            println!(
                " - [{}] {}: {}",
                finding.id.as_str(),
                finding.title,
                finding.description
            );
        }
    }
}
