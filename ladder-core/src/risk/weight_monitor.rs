//! Venue request-weight fuse.
//!
//! The venue reports used weight on every response; when it approaches the
//! hard limit we stop initiating traffic for a cooldown period instead of
//! getting banned. Critical cancels are still let through until the cap
//! itself is exhausted.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, warn};

pub struct WeightMonitor {
    danger_threshold: u32,
    weight_limit: u32,
    cooldown: Duration,
    last_weight: AtomicU32,
    max_weight_seen: AtomicU32,
    cooldown_until: Mutex<Option<Instant>>,
    trip_count: AtomicU64,
}

impl WeightMonitor {
    pub fn new(danger_threshold: u32, weight_limit: u32, cooldown_s: u64) -> Self {
        Self {
            danger_threshold,
            weight_limit,
            cooldown: Duration::from_secs(cooldown_s),
            last_weight: AtomicU32::new(0),
            max_weight_seen: AtomicU32::new(0),
            cooldown_until: Mutex::new(None),
            trip_count: AtomicU64::new(0),
        }
    }

    /// Feed a used-weight reading from a venue response header.
    pub fn observe_weight(&self, weight: u32) {
        self.last_weight.store(weight, Ordering::Release);
        self.max_weight_seen.fetch_max(weight, Ordering::AcqRel);
        if weight >= self.danger_threshold {
            self.trip(weight);
        }
    }

    fn trip(&self, weight: u32) {
        let mut until = self.cooldown_until.lock();
        let was_cool = until.is_some_and(|t| Instant::now() < t);
        *until = Some(Instant::now() + self.cooldown);
        if !was_cool {
            self.trip_count.fetch_add(1, Ordering::Relaxed);
            error!(
                weight,
                threshold = self.danger_threshold,
                cooldown_s = self.cooldown.as_secs(),
                "weight fuse tripped, entering cooldown"
            );
        }
    }

    /// Enter cooldown without a weight reading, e.g. on a venue-signaled
    /// rate-limit rejection.
    pub fn force_cooldown(&self, seconds: u64) {
        let mut until = self.cooldown_until.lock();
        *until = Some(Instant::now() + Duration::from_secs(seconds.max(1)));
        self.trip_count.fetch_add(1, Ordering::Relaxed);
        warn!(seconds, "cooldown forced by venue rate-limit signal");
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_until.lock().is_some_and(|t| Instant::now() < t)
    }

    /// Whether a request may be initiated right now.
    pub fn allow(&self, critical: bool) -> bool {
        if self.last_weight.load(Ordering::Acquire) >= self.weight_limit {
            // Nothing passes the hard cap, not even cancels.
            return false;
        }
        if self.in_cooldown() {
            if critical {
                warn!("critical request during weight cooldown");
                return true;
            }
            return false;
        }
        true
    }

    pub fn last_weight(&self) -> u32 {
        self.last_weight.load(Ordering::Acquire)
    }

    pub fn max_weight_seen(&self) -> u32 {
        self.max_weight_seen.load(Ordering::Acquire)
    }

    pub fn trip_count(&self) -> u64 {
        self.trip_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_danger_allows_everything() {
        let m = WeightMonitor::new(900, 1200, 60);
        m.observe_weight(100);
        assert!(m.allow(false));
        assert!(!m.in_cooldown());
    }

    #[test]
    fn crossing_danger_trips_cooldown_once() {
        let m = WeightMonitor::new(900, 1200, 60);
        m.observe_weight(905);
        m.observe_weight(910);
        assert!(m.in_cooldown());
        assert_eq!(m.trip_count(), 1);
        assert!(!m.allow(false));
        assert!(m.allow(true));
    }

    #[test]
    fn hard_cap_blocks_critical_too() {
        let m = WeightMonitor::new(900, 1200, 60);
        m.observe_weight(1200);
        assert!(!m.allow(true));
    }

    #[test]
    fn cooldown_expires() {
        let m = WeightMonitor::new(900, 1200, 0);
        m.observe_weight(950);
        std::thread::sleep(Duration::from_millis(5));
        m.observe_weight(100);
        assert!(!m.in_cooldown());
        assert!(m.allow(false));
    }

    #[test]
    fn max_weight_is_tracked() {
        let m = WeightMonitor::new(900, 1200, 60);
        m.observe_weight(300);
        m.observe_weight(200);
        assert_eq!(m.max_weight_seen(), 300);
        assert_eq!(m.last_weight(), 200);
    }
}
