//! Secondary market-data path: short-window VWAP over the trade tape.

use crate::core::TradeSample;
use rust_decimal::Decimal;
use std::collections::VecDeque;

const MAX_SAMPLES: usize = 1000;

/// Sliding window of aggregate trades used to synthesize a mid when the
/// book path goes quiet.
#[derive(Debug)]
pub struct TradePath {
    window_ms: u64,
    trades: VecDeque<TradeSample>,
    last_price: Decimal,
    last_update_ns: u64,
}

impl TradePath {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            trades: VecDeque::with_capacity(64),
            last_price: Decimal::ZERO,
            last_update_ns: 0,
        }
    }

    pub fn add_trade(&mut self, price: Decimal, qty: Decimal, ts_ns: u64) {
        if price <= Decimal::ZERO {
            return;
        }
        if self.trades.len() == MAX_SAMPLES {
            self.trades.pop_front();
        }
        self.trades.push_back(TradeSample { price, qty, ts_ns });
        self.last_price = price;
        self.last_update_ns = ts_ns;
        self.evict(ts_ns);
    }

    fn evict(&mut self, now_ns: u64) {
        let cutoff = now_ns.saturating_sub(self.window_ms * 1_000_000);
        while self.trades.front().is_some_and(|t| t.ts_ns < cutoff) {
            self.trades.pop_front();
        }
    }

    pub fn is_fresh(&self, now_ns: u64, max_age_ms: u64) -> bool {
        self.last_price > Decimal::ZERO
            && now_ns.saturating_sub(self.last_update_ns) <= max_age_ms * 1_000_000
    }

    /// Volume-weighted average price over the window; falls back to the
    /// last trade when the window is empty.
    pub fn vwap(&mut self, now_ns: u64) -> Option<Decimal> {
        self.evict(now_ns);
        if self.trades.is_empty() {
            return (self.last_price > Decimal::ZERO).then_some(self.last_price);
        }
        let mut value = Decimal::ZERO;
        let mut volume = Decimal::ZERO;
        for t in &self.trades {
            value += t.price * t.qty;
            volume += t.qty;
        }
        if volume > Decimal::ZERO {
            Some(value / volume)
        } else {
            (self.last_price > Decimal::ZERO).then_some(self.last_price)
        }
    }

    pub fn sample_count(&self) -> usize {
        self.trades.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MS: u64 = 1_000_000;

    #[test]
    fn vwap_weights_by_volume() {
        let mut path = TradePath::new(1000);
        path.add_trade(dec!(0.26400), dec!(100), 0);
        path.add_trade(dec!(0.26500), dec!(300), 10 * MS);
        // (0.264*100 + 0.265*300) / 400 = 0.26475
        assert_eq!(path.vwap(20 * MS), Some(dec!(0.26475)));
    }

    #[test]
    fn window_eviction() {
        let mut path = TradePath::new(1000);
        path.add_trade(dec!(0.20000), dec!(100), 0);
        path.add_trade(dec!(0.26400), dec!(100), 1500 * MS);
        assert_eq!(path.sample_count(), 1);
        assert_eq!(path.vwap(1500 * MS), Some(dec!(0.26400)));
    }

    #[test]
    fn empty_window_falls_back_to_last_trade() {
        let mut path = TradePath::new(1000);
        path.add_trade(dec!(0.26400), dec!(50), 0);
        // Window fully evicted, but the tape still remembers the print.
        assert_eq!(path.vwap(10_000 * MS), Some(dec!(0.26400)));
    }

    #[test]
    fn freshness() {
        let mut path = TradePath::new(1000);
        assert!(!path.is_fresh(0, 1000));
        path.add_trade(dec!(0.264), dec!(1), 0);
        assert!(path.is_fresh(1000 * MS, 1000));
        assert!(!path.is_fresh(1001 * MS, 1000));
    }
}
