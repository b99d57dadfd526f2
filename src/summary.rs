//! Immutable summary models parsed from the driver's control response.
//!
//! One [`MemorySummary`] is produced per collection cycle and never mutated
//! afterwards. All GiB quantities are computed on read from the raw byte
//! counts, never stored.

/// Bytes in one GiB, as f64 for derived-quantity math.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Placeholder rendered for processes whose image name came back empty.
pub const UNNAMED_PROCESS: &str = "<unnamed>";

/// Converts a byte count to GiB.
#[inline]
pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

/// Point-in-time memory summary reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySummary {
    /// Protocol version the driver spoke.
    pub version: u32,
    pub total_phys_bytes: u64,
    pub avail_phys_bytes: u64,
    pub kernel_nonpaged_bytes: u64,
    pub kernel_paged_bytes: u64,
    pub system_cache_bytes: u64,
    /// Whether the driver used the slower forensic page-frame-number scan,
    /// which makes locked/large-page counts exact rather than estimated.
    pub uses_forensic_pfns: bool,
    /// Per-process entries, in the order the driver reported them.
    pub processes: Vec<ProcessEntry>,
}

impl MemorySummary {
    pub fn total_physical_gib(&self) -> f64 {
        bytes_to_gib(self.total_phys_bytes)
    }

    pub fn available_physical_gib(&self) -> f64 {
        bytes_to_gib(self.avail_phys_bytes)
    }

    pub fn kernel_nonpaged_gib(&self) -> f64 {
        bytes_to_gib(self.kernel_nonpaged_bytes)
    }

    pub fn kernel_paged_gib(&self) -> f64 {
        bytes_to_gib(self.kernel_paged_bytes)
    }

    pub fn system_cache_gib(&self) -> f64 {
        bytes_to_gib(self.system_cache_bytes)
    }
}

/// One process as seen by the driver at summary time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEntry {
    /// Process id, unique within one summary.
    pub pid: u32,
    /// Executable image name, trimmed of padding; [`UNNAMED_PROCESS`] if the
    /// driver reported an empty name.
    pub image_name: String,
    pub working_set_bytes: u64,
    pub private_bytes: u64,
    pub locked_bytes: u64,
    pub large_page_bytes: u64,
    pub has_lock_pages_privilege: bool,
    pub is_sql_server: bool,
    pub is_vm_host: bool,
    /// Whether `locked_bytes` is an exact measurement or an estimate.
    pub locked_bytes_exact: bool,
    /// Whether `large_page_bytes` is an exact measurement or an estimate.
    pub large_page_bytes_exact: bool,
}

impl ProcessEntry {
    pub fn working_set_gib(&self) -> f64 {
        bytes_to_gib(self.working_set_bytes)
    }

    pub fn private_gib(&self) -> f64 {
        bytes_to_gib(self.private_bytes)
    }

    pub fn locked_gib(&self) -> f64 {
        bytes_to_gib(self.locked_bytes)
    }

    pub fn large_page_gib(&self) -> f64 {
        bytes_to_gib(self.large_page_bytes)
    }

    /// Private commit beyond the visible working set, clamped to zero.
    /// Approximates memory the process holds outside its working set, e.g.
    /// locked pages.
    pub fn private_minus_working_set_gib(&self) -> f64 {
        bytes_to_gib(self.private_bytes.saturating_sub(self.working_set_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_gib_conversion() {
        assert_eq!(bytes_to_gib(TEST_GIB), 1.0);
        assert_eq!(bytes_to_gib(0), 0.0);
        assert_eq!(bytes_to_gib(TEST_GIB / 2), 0.5);
    }

    #[test]
    fn test_private_minus_working_set_clamps_to_zero() {
        let mut entry = ProcessEntry {
            pid: 1,
            image_name: "sqlservr.exe".to_string(),
            working_set_bytes: 20 * TEST_GIB,
            private_bytes: 80 * TEST_GIB,
            locked_bytes: 0,
            large_page_bytes: 0,
            has_lock_pages_privilege: true,
            is_sql_server: true,
            is_vm_host: false,
            locked_bytes_exact: false,
            large_page_bytes_exact: false,
        };
        assert_eq!(entry.private_minus_working_set_gib(), 60.0);

        // Working set larger than private commit must clamp, not underflow.
        entry.private_bytes = 10 * TEST_GIB;
        assert_eq!(entry.private_minus_working_set_gib(), 0.0);
    }
}
