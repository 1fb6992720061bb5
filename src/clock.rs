//! Monotonic microsecond time base
//!
//! Interval throttling and last-publish timestamps use a monotonic clock
//! anchored at the first use inside this process, so values are comparable
//! across nodes and never jump backwards with wall-clock adjustments.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed since the process time base was established.
///
/// Readings start at 1; the value 0 is reserved so timestamp fields can use
/// it to mean "never".
pub fn monotonic_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_monotonic_non_decreasing() {
        let a = monotonic_us();
        let b = monotonic_us();
        assert!(b >= a);
        assert!(a >= 1);
    }

    #[test]
    fn test_monotonic_advances() {
        let a = monotonic_us();
        thread::sleep(Duration::from_millis(2));
        let b = monotonic_us();
        assert!(b > a);
    }
}
