//! Adaptive depth controller: slot allocation under spread, liquidity and
//! budget pressure.
//!
//! Narrow spreads call for more L0 presence, thin books for more total
//! depth, and a tight message budget pulls the outer layers in first.

use ladder_core::config::LayersConfig;
use std::collections::VecDeque;

const WINDOW_S: f64 = 30.0;
const MIN_SAMPLES: usize = 5;
const GATE_THRESHOLD: f64 = 5.0;
const DEPTH_AMPLE: f64 = 1000.0;

/// Slot allocation per side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAllocation {
    pub l0_slots_per_side: u32,
    pub l1_slots_per_side: u32,
    pub spread_pressure: f64,
    pub liquidity_pressure: f64,
    pub gate_pressure: f64,
}

pub struct AdaptiveDepth {
    config: LayersConfig,
    spread_target_bps: f64,
    spread_history: VecDeque<(f64, f64)>,
    depth_history: VecDeque<(f64, f64)>,
    gate_history: VecDeque<(f64, f64)>,
}

impl AdaptiveDepth {
    pub fn new(config: LayersConfig, spread_target_bps: f64) -> Self {
        Self {
            config,
            spread_target_bps,
            spread_history: VecDeque::new(),
            depth_history: VecDeque::new(),
            gate_history: VecDeque::new(),
        }
    }

    pub fn update_market(&mut self, now_s: f64, spread_bps: f64, bid_qty: f64, ask_qty: f64) {
        self.spread_history.push_back((now_s, spread_bps));
        self.depth_history.push_back((now_s, bid_qty + ask_qty));
        self.evict(now_s);
    }

    /// Remaining per-side fill budget feeds the gate pressure.
    pub fn update_gate(&mut self, now_s: f64, buy_budget: f64, sell_budget: f64) {
        self.gate_history.push_back((now_s, buy_budget + sell_budget));
        self.evict(now_s);
    }

    fn evict(&mut self, now_s: f64) {
        let cutoff = now_s - WINDOW_S;
        for history in [
            &mut self.spread_history,
            &mut self.depth_history,
            &mut self.gate_history,
        ] {
            while history.front().is_some_and(|(ts, _)| *ts < cutoff) {
                history.pop_front();
            }
        }
    }

    /// Spread compression pressure in [0, 1]; 0 at or above target width.
    pub fn spread_pressure(&self) -> f64 {
        if self.spread_history.len() < MIN_SAMPLES {
            return 0.5;
        }
        let recent: Vec<f64> = self.spread_history.iter().rev().take(10).map(|(_, s)| *s).collect();
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        (1.0 - avg / self.spread_target_bps).clamp(0.0, 1.0)
    }

    /// Liquidity scarcity pressure in [0, 1].
    pub fn liquidity_pressure(&self) -> f64 {
        if self.depth_history.len() < MIN_SAMPLES {
            return 0.5;
        }
        let recent: Vec<f64> = self.depth_history.iter().rev().take(10).map(|(_, d)| *d).collect();
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        (1.0 - avg / DEPTH_AMPLE).clamp(0.0, 1.0)
    }

    /// Budget exhaustion pressure in [0, 1].
    pub fn gate_pressure(&self) -> f64 {
        let Some((_, budget)) = self.gate_history.back() else {
            return 0.0;
        };
        (1.0 - budget / (GATE_THRESHOLD * 2.0)).clamp(0.0, 1.0)
    }

    /// Compute the slot allocation.
    pub fn allocate(&self) -> DepthAllocation {
        let spread_p = self.spread_pressure();
        let liquidity_p = self.liquidity_pressure();
        let gate_p = self.gate_pressure();

        let (min_l0, max_l0) = self.config.l0_slots;
        let (_, max_l1) = self.config.l1_slots;

        let l0 = (min_l0 as f64 + spread_p * self.config.spread_sensitivity - gate_p * 0.5)
            .clamp(min_l0 as f64, max_l0 as f64);

        let mut l1 = (self.config.base_l1_slots as f64
            + liquidity_p * self.config.liquidity_sensitivity
            - gate_p * 1.0)
            .clamp(0.0, max_l1 as f64);

        // Budget emergency: keep the touch, drop the tail.
        if gate_p > 0.7 {
            l1 = l1.min(1.0);
        }

        // Total cap: scale L1 down, never L0.
        let total = (l0 + l1) * 2.0;
        if total > self.config.max_total_slots as f64 {
            let room = (self.config.max_total_slots as f64 / 2.0 - l0).max(0.0);
            l1 = l1.min(room);
        }

        DepthAllocation {
            l0_slots_per_side: l0.round() as u32,
            l1_slots_per_side: l1.round() as u32,
            spread_pressure: spread_p,
            liquidity_pressure: liquidity_p,
            gate_pressure: gate_p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_core::config::profiles;
    use rust_decimal_macros::dec;

    fn controller() -> AdaptiveDepth {
        let layers = profiles::default_profile("DOGEUSDT", dec!(1000)).layers;
        AdaptiveDepth::new(layers, 8.0)
    }

    fn feed_market(c: &mut AdaptiveDepth, spread: f64, depth: f64) {
        for i in 0..10 {
            c.update_market(i as f64, spread, depth / 2.0, depth / 2.0);
        }
    }

    #[test]
    fn neutral_market_gives_base_allocation() {
        let mut c = controller();
        feed_market(&mut c, 8.0, 1000.0);
        c.update_gate(10.0, 10.0, 10.0);
        let a = c.allocate();
        assert_eq!(a.l0_slots_per_side, 2);
        assert_eq!(a.l1_slots_per_side, 2);
    }

    #[test]
    fn compressed_spread_adds_l0() {
        let mut c = controller();
        feed_market(&mut c, 2.0, 1000.0);
        c.update_gate(10.0, 10.0, 10.0);
        let a = c.allocate();
        assert!(a.spread_pressure > 0.7);
        assert!(a.l0_slots_per_side >= 3);
    }

    #[test]
    fn thin_book_adds_l1() {
        let mut c = controller();
        feed_market(&mut c, 8.0, 100.0);
        c.update_gate(10.0, 10.0, 10.0);
        let a = c.allocate();
        assert!(a.liquidity_pressure > 0.8);
        assert!(a.l1_slots_per_side >= 3);
    }

    #[test]
    fn tight_gate_forces_l1_down() {
        let mut c = controller();
        feed_market(&mut c, 4.0, 500.0);
        c.update_gate(10.0, 0.5, 0.5);
        let a = c.allocate();
        assert!(a.gate_pressure > 0.7);
        assert!(a.l1_slots_per_side <= 1);
    }

    #[test]
    fn total_slots_respect_cap_preserving_l0() {
        let mut c = controller();
        // Max pressure everywhere except the gate.
        feed_market(&mut c, 0.5, 10.0);
        c.update_gate(10.0, 20.0, 20.0);
        let a = c.allocate();
        let total = 2 * (a.l0_slots_per_side + a.l1_slots_per_side);
        assert!(total <= 12, "total {} exceeds cap", total);
        assert_eq!(a.l0_slots_per_side, 4); // L0 kept at its max
    }

    #[test]
    fn cold_start_defaults_are_neutral() {
        let c = controller();
        let a = c.allocate();
        assert_eq!(a.gate_pressure, 0.0);
        assert!(a.l0_slots_per_side >= 2);
    }
}
