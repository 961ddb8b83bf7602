//! Jittered exponential backoff for transient connector errors.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: Option<usize>,
    /// Randomization factor in [0, 1] applied symmetrically.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: Some(10),
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Slow ramp for production reconnects.
    pub fn conservative() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_retries: Some(20),
            jitter_factor: 0.2,
        }
    }
}

/// Backoff state machine. `next_delay` returns `None` once retries are
/// exhausted.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: usize,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self { config, attempt: 0, current }
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.attempt >= max {
                return None;
            }
        }
        self.attempt += 1;

        let base = self.current;
        let next = base.mul_f64(self.config.multiplier).min(self.config.max_delay);
        self.current = next;

        let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Some(base);
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        Some(base.mul_f64(factor).min(self.config.max_delay))
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = self.config.initial_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_retries: Option<usize>) -> ExponentialBackoff {
        ExponentialBackoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_retries,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn delays_grow_and_cap() {
        let mut b = no_jitter(None);
        assert_eq!(b.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(800)));
        assert_eq!(b.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(b.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn retries_exhaust() {
        let mut b = no_jitter(Some(2));
        assert!(b.next_delay().is_some());
        assert!(b.next_delay().is_some());
        assert!(b.next_delay().is_none());
    }

    #[test]
    fn reset_restores_initial() {
        let mut b = no_jitter(Some(3));
        let first = b.next_delay().unwrap();
        let _ = b.next_delay();
        b.reset();
        assert_eq!(b.next_delay().unwrap(), first);
    }

    #[test]
    fn jitter_stays_within_band() {
        let mut b = ExponentialBackoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_retries: None,
            jitter_factor: 0.1,
        });
        for _ in 0..50 {
            let d = b.next_delay().unwrap();
            assert!(d <= Duration::from_secs(10));
            assert!(d >= Duration::from_millis(50));
        }
    }
}
