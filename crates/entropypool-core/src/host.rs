//! Host environment counters folded into every rehash.
//!
//! These values are partially observable by anyone on the same machine and
//! carry very little real unpredictability. They diffuse the rehash input
//! between iterations and between machines; no security property depends on
//! them. Every reader is best-effort and reports zero where the platform has
//! no equivalent.

use std::sync::OnceLock;
use std::time::Instant;

/// Snapshot of the host values fed to the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCounters {
    /// Logical processors available to this process.
    pub processors: u32,
    /// Physical memory currently free, in bytes.
    pub free_memory: u64,
    /// Address-space limit of this process, in bytes (`u64::MAX` if unlimited).
    pub max_memory: u64,
    /// Installed physical memory, in bytes.
    pub total_memory: u64,
}

impl HostCounters {
    pub fn sample() -> Self {
        Self {
            processors: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
            free_memory: free_memory(),
            max_memory: max_memory(),
            total_memory: total_memory(),
        }
    }
}

/// Monotonic nanoseconds relative to a process-local epoch.
pub fn monotonic_nanos() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as i64
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions; a negative return means "unknown".
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 0 }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn free_memory() -> u64 {
    // SAFETY: see page_size.
    let pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
    if pages > 0 {
        (pages as u64).saturating_mul(page_size())
    } else {
        0
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn free_memory() -> u64 {
    0
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
fn total_memory() -> u64 {
    // SAFETY: see page_size.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    if pages > 0 {
        (pages as u64).saturating_mul(page_size())
    } else {
        0
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
fn total_memory() -> u64 {
    0
}

#[cfg(unix)]
fn max_memory() -> u64 {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut limit) };
    if ret != 0 {
        return 0;
    }
    if limit.rlim_cur == libc::RLIM_INFINITY {
        u64::MAX
    } else {
        limit.rlim_cur as u64
    }
}

#[cfg(not(unix))]
fn max_memory() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reports_processors() {
        let h = HostCounters::sample();
        assert!(h.processors >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sample_reports_memory_on_linux() {
        let h = HostCounters::sample();
        assert!(h.total_memory > 0);
        assert!(h.free_memory <= h.total_memory);
        assert!(h.max_memory > 0);
    }

    #[test]
    fn test_monotonic_nanos_never_decreases() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }
}
