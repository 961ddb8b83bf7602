//! Wall-clock nanoseconds since the Unix epoch.
//!
//! Used for event timestamps and TTL bookkeeping. Monotonic intervals are
//! measured with `Instant` at the call sites that need them.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn epoch_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub fn epoch_ms() -> u64 {
    epoch_ns() / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotone_enough() {
        let a = epoch_ns();
        let b = epoch_ns();
        assert!(b >= a);
        assert!(a > 1_600_000_000 * 1_000_000_000);
    }
}
