use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Memory diagnostics reported by `/status`.
pub trait MemoryProbe: Send + Sync {
    fn free_bytes(&self) -> u64;

    /// Lowest free memory observed so far.
    fn min_free_bytes(&self) -> u64;
}

/// Reads `MemAvailable` from `/proc/meminfo`; reports 0 where that is unavailable.
pub struct HostMemoryProbe {
    low_water_mark: AtomicU64,
}

impl Default for HostMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemoryProbe {
    pub fn new() -> Self {
        let probe = Self {
            low_water_mark: AtomicU64::new(u64::MAX),
        };
        probe.free_bytes();
        probe
    }
}

impl MemoryProbe for HostMemoryProbe {
    fn free_bytes(&self) -> u64 {
        let free = match std::fs::read_to_string("/proc/meminfo") {
            Ok(content) => parse_mem_available(&content).unwrap_or(0),
            Err(e) => {
                debug!("Cannot read /proc/meminfo: {}", e);
                0
            }
        };
        self.low_water_mark.fetch_min(free, Ordering::SeqCst);
        free
    }

    fn min_free_bytes(&self) -> u64 {
        self.free_bytes();
        self.low_water_mark.load(Ordering::SeqCst)
    }
}

/// `MemAvailable` in bytes.
fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let kib: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kib * 1024)
    })
}
