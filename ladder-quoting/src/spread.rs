//! Dynamic spread optimizer with an expected-value gate.
//!
//! The quoted half-spread has to clear costs before it is allowed to
//! tighten: twice the maker fee plus an adverse-selection charge scaled
//! by realized vol. On top of that floor, the target adapts to vol and
//! order-flow lean.

use ladder_core::config::SpreadConfig;
use ladder_core::Side;
use std::collections::VecDeque;

const LOW_VOL: f64 = 0.001;
const HIGH_VOL: f64 = 0.005;
const FLOW_SAMPLES: usize = 10;

pub struct SpreadOptimizer {
    config: SpreadConfig,
    flow_samples: VecDeque<f64>,
}

impl SpreadOptimizer {
    pub fn new(config: SpreadConfig) -> Self {
        Self { config, flow_samples: VecDeque::with_capacity(64) }
    }

    /// Record a signed order-flow imbalance sample in [-1, 1].
    pub fn update_flow(&mut self, imbalance: f64) {
        if self.flow_samples.len() == 50 {
            self.flow_samples.pop_front();
        }
        self.flow_samples.push_back(imbalance.clamp(-1.0, 1.0));
    }

    /// Minimum spread (bp) for positive expected value at the given vol.
    pub fn required_spread_bp(&self, vol_bp: f64) -> f64 {
        let fee_component = 2.0 * self.config.maker_fee_bp.abs();
        let vol_component = self.config.adverse_selection_factor * vol_bp;
        (fee_component + vol_component).max(self.config.min_spread_bp)
    }

    fn vol_adjustment(volatility: f64) -> f64 {
        if volatility < LOW_VOL {
            -1.0
        } else if volatility > HIGH_VOL {
            4.0
        } else {
            let normalized = (volatility - LOW_VOL) / (HIGH_VOL - LOW_VOL);
            normalized * 5.0 - 1.0
        }
    }

    fn flow_adjustment(&self, side: Side) -> f64 {
        if self.flow_samples.len() < FLOW_SAMPLES {
            return 0.0;
        }
        let recent: Vec<f64> =
            self.flow_samples.iter().rev().take(FLOW_SAMPLES).copied().collect();
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        match side {
            // Pressure toward a side means quoting it wider.
            Side::Buy if avg > 0.2 => 0.5,
            Side::Sell if avg < -0.2 => 0.5,
            _ if avg.abs() < 0.1 => -0.5,
            _ => 0.0,
        }
    }

    /// Optimal full spread (bp) for one side. `volatility` is the
    /// fraction-per-sample realized vol.
    pub fn optimal_spread_bp(&self, side: Side, volatility: f64) -> f64 {
        let target = self.config.base_spread_bp
            + Self::vol_adjustment(volatility)
            + self.flow_adjustment(side);

        let required = self.required_spread_bp(volatility * 10_000.0);
        let gated = target.max(required);

        let (lo, hi) = self.config.spread_range_bp;
        let lo = lo.max(self.config.min_spread_bp);
        gated.clamp(lo, hi.max(lo))
    }

    /// Half-spread as a fraction of mid.
    pub fn half_spread_fraction(&self, side: Side, volatility: f64) -> f64 {
        self.optimal_spread_bp(side, volatility) / 10_000.0 / 2.0
    }
}
