//! Token-bucket rate limiting, one bucket per message stream.
//!
//! Capacity equals the burst quota, refill rate equals the 10-second
//! budget, and a separate 10-second window count enforces the budget even
//! when bursts would otherwise let more through. The governor rewrites
//! budget and burst every window via `reconfigure`.

use crate::core::Bucket;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

const WINDOW: Duration = Duration::from_secs(10);
/// Fixed-point scale for fractional tokens.
const MILLI: u64 = 1000;

/// One token bucket with a rolling 10-second window count.
pub struct TokenBucket {
    budget_10s: AtomicU32,
    burst: AtomicU32,
    tokens_milli: AtomicU64,
    last_refill: Mutex<Instant>,
    window_start: Mutex<Instant>,
    window_count: AtomicU32,
    total_allowed: AtomicU64,
    total_rejected: AtomicU64,
}

impl TokenBucket {
    pub fn new(budget_10s: u32, burst: u32) -> Self {
        let now = Instant::now();
        Self {
            budget_10s: AtomicU32::new(budget_10s),
            burst: AtomicU32::new(burst.max(1)),
            tokens_milli: AtomicU64::new(burst.max(1) as u64 * MILLI),
            last_refill: Mutex::new(now),
            window_start: Mutex::new(now),
            window_count: AtomicU32::new(0),
            total_allowed: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Replace budget and burst. Tokens are clamped to the new burst so a
    /// shrinking quota takes effect immediately.
    pub fn reconfigure(&self, budget_10s: u32, burst: u32) {
        let burst = burst.max(1);
        self.budget_10s.store(budget_10s, Ordering::Release);
        self.burst.store(burst, Ordering::Release);
        let cap = burst as u64 * MILLI;
        let _ = self
            .tokens_milli
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some(t.min(cap)));
    }

    /// Try to consume one token within the window budget.
    pub fn try_acquire(&self) -> bool {
        self.refill();
        self.roll_window();

        let budget = self.budget_10s.load(Ordering::Acquire);
        if self.window_count.load(Ordering::Acquire) >= budget {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut current = self.tokens_milli.load(Ordering::Acquire);
        loop {
            if current < MILLI {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.tokens_milli.compare_exchange_weak(
                current,
                current - MILLI,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.window_count.fetch_add(1, Ordering::AcqRel);
                    self.total_allowed.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Consume a slot regardless of budget. Used for critical cancels; the
    /// window count still advances so usage telemetry stays honest.
    pub fn force_acquire(&self) {
        self.roll_window();
        self.window_count.fetch_add(1, Ordering::AcqRel);
        self.total_allowed.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .tokens_milli
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some(t.saturating_sub(MILLI)));
    }

    fn refill(&self) {
        let mut last = self.last_refill.lock();
        let elapsed = last.elapsed();
        if elapsed < Duration::from_millis(100) {
            return;
        }
        let budget = self.budget_10s.load(Ordering::Acquire) as f64;
        let rate_per_s = budget / WINDOW.as_secs_f64();
        let add = (rate_per_s * elapsed.as_secs_f64() * MILLI as f64) as u64;
        if add > 0 {
            let cap = self.burst.load(Ordering::Acquire) as u64 * MILLI;
            let _ = self
                .tokens_milli
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some((t + add).min(cap)));
            *last = Instant::now();
        }
    }

    fn roll_window(&self) {
        let mut start = self.window_start.lock();
        if start.elapsed() >= WINDOW {
            *start = Instant::now();
            self.window_count.store(0, Ordering::Release);
        }
    }

    /// Share of the window budget consumed, in percent.
    pub fn usage_pct(&self) -> f64 {
        let budget = self.budget_10s.load(Ordering::Acquire).max(1);
        self.window_count.load(Ordering::Acquire) as f64 / budget as f64 * 100.0
    }

    pub fn window_count(&self) -> u32 {
        self.window_count.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u32 {
        let budget = self.budget_10s.load(Ordering::Acquire);
        budget.saturating_sub(self.window_count.load(Ordering::Acquire))
    }

    pub fn total_allowed(&self) -> u64 {
        self.total_allowed.load(Ordering::Acquire)
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::Acquire)
    }
}

/// The three bucket streams plus the cooldown fuse, wired together as the
/// single admission point for outbound messages.
#[derive(Clone)]
pub struct RateGate {
    fill: Arc<TokenBucket>,
    reprice: Arc<TokenBucket>,
    cancel: Arc<TokenBucket>,
    weight: Arc<super::weight_monitor::WeightMonitor>,
}

impl RateGate {
    pub fn new(
        budgets: (u32, u32, u32),
        bursts: (u32, u32, u32),
        weight: Arc<super::weight_monitor::WeightMonitor>,
    ) -> Self {
        Self {
            fill: Arc::new(TokenBucket::new(budgets.0, bursts.0)),
            reprice: Arc::new(TokenBucket::new(budgets.1, bursts.1)),
            cancel: Arc::new(TokenBucket::new(budgets.2, bursts.2)),
            weight,
        }
    }

    pub fn weight(&self) -> &super::weight_monitor::WeightMonitor {
        &self.weight
    }

    pub fn bucket(&self, bucket: Bucket) -> &TokenBucket {
        match bucket {
            Bucket::Fill => &self.fill,
            Bucket::Reprice => &self.reprice,
            Bucket::Cancel => &self.cancel,
        }
    }

    /// Admission check. Critical requests pass through cooldown and an
    /// exhausted budget, but nothing passes once the venue weight cap
    /// itself is exhausted.
    pub fn admit(&self, bucket: Bucket, critical: bool) -> bool {
        if !self.weight.allow(critical) {
            return false;
        }
        if critical {
            self.bucket(bucket).force_acquire();
            return true;
        }
        if self.weight.in_cooldown() {
            return false;
        }
        let ok = self.bucket(bucket).try_acquire();
        if !ok {
            warn!(bucket = bucket.as_str(), "rate gate rejected request");
        }
        ok
    }

    pub fn reconfigure(&self, bucket: Bucket, budget_10s: u32, burst: u32) {
        self.bucket(bucket).reconfigure(budget_10s, burst);
    }

    /// Worst usage across buckets, the number the governor tracks.
    pub fn usage_pct(&self) -> f64 {
        Bucket::ALL
            .iter()
            .map(|b| self.bucket(*b).usage_pct())
            .fold(0.0, f64::max)
    }

    pub fn window_counts(&self) -> (u32, u32, u32) {
        (self.fill.window_count(), self.reprice.window_count(), self.cancel.window_count())
    }
}
