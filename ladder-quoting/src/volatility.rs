//! Short-horizon realized volatility estimation for spread adjustment.

use std::collections::VecDeque;

/// Rolling mean-absolute-return estimator over the most recent samples.
///
/// Returns are fractions per sample; `vol_bp` converts to basis points.
#[derive(Debug, Clone)]
pub struct RollingVolatility {
    prices: VecDeque<f64>,
    capacity: usize,
    horizon: usize,
    current: f64,
}

impl RollingVolatility {
    pub fn new(capacity: usize, horizon: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
            horizon: horizon.max(2),
            current: 0.0,
        }
    }

    pub fn add_price(&mut self, price: f64) {
        if price <= 0.0 {
            return;
        }
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
        self.recompute();
    }

    fn recompute(&mut self) {
        let n = self.prices.len();
        if n < 2 {
            self.current = 0.0;
            return;
        }
        let start = n.saturating_sub(self.horizon);
        let window: Vec<f64> = self.prices.iter().skip(start).copied().collect();
        let mut sum = 0.0;
        let mut count = 0;
        for pair in window.windows(2) {
            if pair[0] > 0.0 {
                sum += (pair[1] - pair[0]).abs() / pair[0];
                count += 1;
            }
        }
        self.current = if count > 0 { sum / count as f64 } else { 0.0 };
    }

    /// Volatility as a fraction per sample.
    pub fn value(&self) -> f64 {
        self.current
    }

    pub fn vol_bp(&self) -> f64 {
        self.current * 10_000.0
    }

    pub fn is_ready(&self) -> bool {
        self.prices.len() >= self.horizon / 2
    }
}

/// EWMA of absolute returns; adapts faster across regime changes.
#[derive(Debug, Clone)]
pub struct EwmaVolatility {
    alpha: f64,
    ewma: f64,
    last_price: Option<f64>,
    count: usize,
}

impl EwmaVolatility {
    pub fn new(alpha: f64) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0), ewma: 0.0, last_price: None, count: 0 }
    }

    pub fn add_price(&mut self, price: f64) {
        if price <= 0.0 {
            return;
        }
        if let Some(last) = self.last_price {
            let ret = (price - last).abs() / last;
            self.ewma = if self.count == 0 {
                ret
            } else {
                (1.0 - self.alpha) * self.ewma + self.alpha * ret
            };
            self.count += 1;
        }
        self.last_price = Some(price);
    }

    pub fn value(&self) -> f64 {
        self.ewma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_prices_have_zero_vol() {
        let mut v = RollingVolatility::new(100, 10);
        for _ in 0..20 {
            v.add_price(0.264);
        }
        assert_eq!(v.value(), 0.0);
    }

    #[test]
    fn alternating_prices_measure_mean_abs_return() {
        let mut v = RollingVolatility::new(100, 10);
        // +1% then -0.990...% alternating
        for i in 0..10 {
            v.add_price(if i % 2 == 0 { 100.0 } else { 101.0 });
        }
        assert!(v.value() > 0.009 && v.value() < 0.011);
        assert!(v.vol_bp() > 90.0);
    }

    #[test]
    fn horizon_limits_lookback() {
        let mut v = RollingVolatility::new(100, 5);
        // Old violent swings fall out of the horizon.
        for p in [100.0, 150.0, 100.0, 150.0] {
            v.add_price(p);
        }
        for _ in 0..10 {
            v.add_price(100.0);
        }
        assert_relative_eq!(v.value(), 0.0);
    }

    #[test]
    fn ewma_decays_after_spike() {
        let mut v = EwmaVolatility::new(0.2);
        v.add_price(100.0);
        v.add_price(110.0); // 10% move
        let spike = v.value();
        for _ in 0..30 {
            v.add_price(110.0);
        }
        assert!(v.value() < spike / 10.0);
    }

    #[test]
    fn ignores_non_positive_prices() {
        let mut v = RollingVolatility::new(10, 5);
        v.add_price(0.0);
        v.add_price(-5.0);
        assert!(!v.is_ready());
    }
}
