//! Kernel constants the exporter needs to turn raw `/proc` counters into units.

/// Clock ticks per second (USER_HZ) used when the platform does not report one.
pub const DEFAULT_CLK_TCK: u64 = 100;

/// Page size used when the platform does not report one.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Clock ticks per second, as reported by `sysconf(_SC_CLK_TCK)`.
///
/// Falls back to [`DEFAULT_CLK_TCK`] if the call fails.
#[cfg(unix)]
pub fn clock_ticks_per_second() -> u64 {
    positive_or(sysconf(libc::_SC_CLK_TCK), DEFAULT_CLK_TCK)
}

#[cfg(not(unix))]
pub fn clock_ticks_per_second() -> u64 {
    DEFAULT_CLK_TCK
}

/// Memory page size in bytes, as reported by `sysconf(_SC_PAGESIZE)`.
///
/// Falls back to [`DEFAULT_PAGE_SIZE`] if the call fails.
#[cfg(unix)]
pub fn page_size() -> u64 {
    positive_or(sysconf(libc::_SC_PAGESIZE), DEFAULT_PAGE_SIZE)
}

#[cfg(not(unix))]
pub fn page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[cfg(unix)]
fn sysconf(name: libc::c_int) -> i64 {
    // SAFETY: sysconf only reads a configuration value; -1 signals "unsupported".
    unsafe { libc::sysconf(name) as i64 }
}

#[cfg_attr(not(unix), allow(dead_code))]
fn positive_or(value: i64, default: u64) -> u64 {
    if value > 0 { value as u64 } else { default }
}
