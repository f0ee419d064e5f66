//! Nanosecond-precision timing utilities
//!
//! All engine timestamps (rate budget refill, reconnect backoff, run deadline) are monotonic
//! nanoseconds since the first call to [`time_ns`].

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global start time for monotonic nanosecond timestamps
static START: OnceLock<Instant> = OnceLock::new();

/// Get current time in nanoseconds since program start
///
/// # Example
/// ```
/// use phloem_core::timing::time_ns;
///
/// let start = time_ns();
/// let elapsed = time_ns() - start;
/// assert!(elapsed < 1_000_000_000);
/// ```
#[inline]
pub fn time_ns() -> u64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Suspend the calling thread until `target_ns`
///
/// Sleeps rather than spinning: a rate-limited or backing-off connection yields its thread.
pub fn sleep_until(target_ns: u64) {
    let now = time_ns();
    if target_ns > now {
        std::thread::sleep(Duration::from_nanos(target_ns - now));
    }
}

/// Convert a duration to nanoseconds, saturating at `u64::MAX`
#[inline]
pub fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
