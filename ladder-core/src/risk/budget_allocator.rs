//! Dynamic burst sizing and inter-bucket budget borrowing.
//!
//! Sits on top of the governor's per-window budgets: buckets that run hot
//! and efficient earn larger bursts and may borrow quota from buckets that
//! are idling, in the order cancel → reprice → fill.

use crate::core::Bucket;
use std::collections::VecDeque;
use tracing::debug;

const RECENT_USAGE_S: f64 = 30.0;
const SURGE_WINDOW_S: f64 = 10.0;
const BURST_WINDOW_S: f64 = 20.0;

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Result of one allocation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub budgets: [u32; 3],
    pub bursts: [u32; 3],
    pub borrowed: [u32; 3],
    pub lent: [u32; 3],
}

pub struct BudgetAllocator {
    window_s: f64,
    min_samples: usize,
    base_burst_ratio: f64,
    max_burst_ratio: f64,
    max_borrow_ratio: f64,
    /// (ts, bucket, usage ratio) observations.
    usage_history: VecDeque<(f64, Bucket, f64)>,
    /// (ts, bucket) burst events.
    burst_history: VecDeque<(f64, Bucket)>,
    emergency_level: f64,
    efficiency_scores: [f64; 3],
    urgency_factors: [f64; 3],
}

impl Default for BudgetAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetAllocator {
    pub fn new() -> Self {
        Self {
            window_s: 60.0,
            min_samples: 5,
            base_burst_ratio: 1.0,
            max_burst_ratio: 3.0,
            max_borrow_ratio: 0.5,
            usage_history: VecDeque::new(),
            burst_history: VecDeque::new(),
            emergency_level: 0.0,
            efficiency_scores: [1.0; 3],
            urgency_factors: [1.0; 3],
        }
    }

    pub fn record_usage(&mut self, now_s: f64, bucket: Bucket, used: u32, total: u32) {
        let ratio = used as f64 / total.max(1) as f64;
        self.usage_history.push_back((now_s, bucket, ratio));
        self.evict(now_s);
    }

    pub fn record_burst(&mut self, now_s: f64, bucket: Bucket) {
        self.burst_history.push_back((now_s, bucket));
        self.evict(now_s);
    }

    /// System urgency in [0, 1], e.g. from the engine's degraded state.
    pub fn set_emergency_level(&mut self, level: f64) {
        self.emergency_level = clamp(level, 0.0, 1.0);
    }

    fn evict(&mut self, now_s: f64) {
        let cutoff = now_s - self.window_s;
        while self.usage_history.front().is_some_and(|(ts, _, _)| *ts < cutoff) {
            self.usage_history.pop_front();
        }
        while self.burst_history.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.burst_history.pop_front();
        }
    }

    /// Banded efficiency score: ideal utilization sits around 85%.
    fn usage_efficiency(&self, now_s: f64, bucket: Bucket) -> f64 {
        let recent: Vec<f64> = self
            .usage_history
            .iter()
            .filter(|(ts, b, _)| *b == bucket && now_s - ts <= RECENT_USAGE_S)
            .map(|(_, _, r)| *r)
            .collect();
        if recent.len() < self.min_samples {
            return 1.0;
        }
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        match avg {
            a if (0.8..=0.9).contains(&a) => 2.0,
            a if (0.6..=1.0).contains(&a) => 1.5,
            a if (0.3..0.6).contains(&a) => 1.0,
            _ => 0.5,
        }
    }

    /// Urgency factor in [0.5, 3.0]: usage surge × burst frequency ×
    /// system emergency.
    fn urgency_factor(&self, now_s: f64, bucket: Bucket) -> f64 {
        let recent: Vec<f64> = self
            .usage_history
            .iter()
            .filter(|(ts, b, _)| *b == bucket && now_s - ts <= SURGE_WINDOW_S)
            .map(|(_, _, r)| *r)
            .collect();

        let usage_surge = if recent.len() >= 3 {
            let split = recent.len() - 3;
            let newest = &recent[split..];
            let older = if split > 0 { &recent[..split] } else { newest };
            let new_avg = newest.iter().sum::<f64>() / newest.len() as f64;
            let old_avg = older.iter().sum::<f64>() / older.len() as f64;
            clamp(new_avg / old_avg.max(0.1), 0.0, 3.0)
        } else {
            1.0
        };

        let bursts = self
            .burst_history
            .iter()
            .filter(|(ts, b)| *b == bucket && now_s - ts <= BURST_WINDOW_S)
            .count();
        let burst_factor = 1.0 + (bursts as f64 / BURST_WINDOW_S * 10.0).min(1.0);

        let emergency_factor = 1.0 + self.emergency_level;

        clamp(usage_surge * burst_factor * emergency_factor, 0.5, 3.0)
    }

    /// Burst quota for one bucket given its base budget.
    pub fn dynamic_burst(&mut self, now_s: f64, bucket: Bucket, base_budget: u32) -> u32 {
        let efficiency = self.usage_efficiency(now_s, bucket);
        let urgency = self.urgency_factor(now_s, bucket);

        let ratio = clamp(
            self.base_burst_ratio + 0.5 * (efficiency - 1.0) + 0.3 * (urgency - 1.0),
            self.base_burst_ratio,
            self.max_burst_ratio,
        );

        self.efficiency_scores[bucket_idx(bucket)] = efficiency;
        self.urgency_factors[bucket_idx(bucket)] = urgency;

        (base_budget as f64 * ratio) as u32
    }

    /// Full pass: dynamic bursts for every bucket, then borrowing from
    /// cold buckets into hot ones.
    pub fn optimize(&mut self, now_s: f64, base_budgets: [u32; 3]) -> Allocation {
        let mut bursts = [0u32; 3];
        for bucket in Bucket::ALL {
            bursts[bucket_idx(bucket)] =
                self.dynamic_burst(now_s, bucket, base_budgets[bucket_idx(bucket)]);
        }

        let mut budgets = base_budgets;
        let mut borrowed = [0u32; 3];
        let mut lent = [0u32; 3];

        // Hot and efficient buckets qualify to borrow, hungriest first.
        let mut candidates: Vec<(Bucket, f64)> = Bucket::ALL
            .iter()
            .copied()
            .filter(|b| {
                self.urgency_factors[bucket_idx(*b)] > 2.0
                    && self.efficiency_scores[bucket_idx(*b)] > 1.2
            })
            .map(|b| (b, self.urgency_factors[bucket_idx(b)] * self.efficiency_scores[bucket_idx(b)]))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        // Lending priority: cancel first, fill last.
        const LEND_ORDER: [Bucket; 3] = [Bucket::Cancel, Bucket::Reprice, Bucket::Fill];

        for (borrower, _) in candidates {
            let bi = bucket_idx(borrower);
            let max_borrow = (base_budgets[bi] as f64 * self.max_borrow_ratio) as u32;
            let mut taken = 0u32;

            for lender in LEND_ORDER {
                if lender == borrower || taken >= max_borrow {
                    continue;
                }
                let li = bucket_idx(lender);
                let cold = self.urgency_factors[li] < 1.5 && self.efficiency_scores[li] < 1.2;
                if !cold {
                    continue;
                }
                let lendable = ((base_budgets[li] as f64 * self.max_borrow_ratio) as u32)
                    .saturating_sub(lent[li]);
                let amount = lendable.min(max_borrow - taken).min(budgets[li]);
                if amount == 0 {
                    continue;
                }
                budgets[bi] += amount;
                budgets[li] -= amount;
                borrowed[bi] += amount;
                lent[li] += amount;
                taken += amount;
                debug!(
                    from = lender.as_str(),
                    to = borrower.as_str(),
                    amount,
                    "budget borrowed"
                );
            }
        }

        Allocation { budgets, bursts, borrowed, lent }
    }

    pub fn efficiency(&self, bucket: Bucket) -> f64 {
        self.efficiency_scores[bucket_idx(bucket)]
    }

    pub fn urgency(&self, bucket: Bucket) -> f64 {
        self.urgency_factors[bucket_idx(bucket)]
    }
}

#[inline]
fn bucket_idx(bucket: Bucket) -> usize {
    match bucket {
        Bucket::Fill => 0,
        Bucket::Reprice => 1,
        Bucket::Cancel => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_neutral() {
        let mut a = BudgetAllocator::new();
        let alloc = a.optimize(0.0, [10, 10, 25]);
        assert_eq!(alloc.budgets, [10, 10, 25]);
        assert_eq!(alloc.bursts, [10, 10, 25]);
        assert_eq!(alloc.borrowed, [0, 0, 0]);
    }

    #[test]
    fn efficient_usage_earns_bigger_burst() {
        let mut a = BudgetAllocator::new();
        for i in 0..10 {
            a.record_usage(i as f64, Bucket::Fill, 85, 100);
        }
        let burst = a.dynamic_burst(10.0, Bucket::Fill, 10);
        assert!(burst > 10, "burst {} should exceed base", burst);
    }

    #[test]
    fn idle_bucket_keeps_base_burst() {
        let mut a = BudgetAllocator::new();
        for i in 0..10 {
            a.record_usage(i as f64, Bucket::Reprice, 5, 100);
        }
        // Low efficiency pulls the ratio down, floored at base.
        assert_eq!(a.dynamic_burst(10.0, Bucket::Reprice, 10), 10);
    }

    #[test]
    fn hot_bucket_borrows_from_cold_ones() {
        let mut a = BudgetAllocator::new();
        let now = 30.0;
        // Fill: high efficiency and a sharp surge.
        for i in 0..6 {
            a.record_usage(now - 6.0 + i as f64, Bucket::Fill, if i < 3 { 30 } else { 90 }, 100);
        }
        for i in 0..4 {
            a.record_burst(now - 4.0 + i as f64, Bucket::Fill);
        }
        // Cancel and reprice: idle.
        for i in 0..10 {
            a.record_usage(now - 10.0 + i as f64, Bucket::Cancel, 5, 100);
            a.record_usage(now - 10.0 + i as f64, Bucket::Reprice, 5, 100);
        }

        let alloc = a.optimize(now, [10, 10, 30]);
        assert!(alloc.borrowed[0] > 0, "fill should borrow, got {:?}", alloc);
        assert!(alloc.lent[2] > 0, "cancel lends first, got {:?}", alloc);
        // Borrowing is capped at half the borrower's own budget.
        assert!(alloc.borrowed[0] <= 5);
        // Conservation: nothing created or destroyed.
        let before: u32 = [10u32, 10, 30].iter().sum();
        let after: u32 = alloc.budgets.iter().sum();
        assert_eq!(before, after);
    }

    #[test]
    fn urgency_is_clamped() {
        let mut a = BudgetAllocator::new();
        a.set_emergency_level(5.0); // clamped to 1.0
        for i in 0..6 {
            a.record_usage(i as f64, Bucket::Fill, if i < 3 { 1 } else { 100 }, 100);
        }
        let u = a.urgency_factor(6.0, Bucket::Fill);
        assert!((0.5..=3.0).contains(&u));
    }
}
