//! Order-flow toxicity filter.
//!
//! Four microstructure signals — spread compression, trade-intensity
//! surge, depth imbalance and short-horizon momentum — blend into one
//! score in [0, 1]. Below the defense threshold quoting turns mildly
//! aggressive; above it sizes decay exponentially, spreads widen and
//! TTLs shorten.

use ladder_core::config::ToxicityConfig;
use std::collections::VecDeque;
use tracing::debug;

const SPREAD_WEIGHT: f64 = 0.30;
const INTENSITY_WEIGHT: f64 = 0.25;
const IMBALANCE_WEIGHT: f64 = 0.25;
const MOMENTUM_WEIGHT: f64 = 0.20;
const MIN_SAMPLES: usize = 3;
const BASELINE_WINDOW_S: f64 = 60.0;
const INTENSITY_WINDOW_S: f64 = 10.0;
const SIZE_DECAY_K: f64 = 2.0;

/// Defense outputs consumed by the spread optimizer and planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToxicityAnalysis {
    pub score: f64,
    pub widen_bps: f64,
    pub size_scale: f64,
    pub ttl_scale: f64,
    pub defense_mode: bool,
}

pub struct ToxicityFilter {
    config: ToxicityConfig,
    spread_history: VecDeque<(f64, f64)>,
    trade_history: VecDeque<(f64, f64)>,
    imbalance_history: VecDeque<(f64, f64)>,
    price_history: VecDeque<(f64, f64)>,
    baseline_spread: f64,
    baseline_trade_intensity: f64,
}

impl ToxicityFilter {
    pub fn new(config: ToxicityConfig) -> Self {
        Self {
            config,
            spread_history: VecDeque::new(),
            trade_history: VecDeque::new(),
            imbalance_history: VecDeque::new(),
            price_history: VecDeque::new(),
            baseline_spread: 50.0,
            baseline_trade_intensity: 0.0,
        }
    }

    pub fn update_spread(&mut self, now_s: f64, spread_bps: f64) {
        self.spread_history.push_back((now_s, spread_bps));
        self.evict(now_s);
        if self.spread_history.len() >= 10 {
            let recent: Vec<f64> =
                self.spread_history.iter().rev().take(10).map(|(_, s)| *s).collect();
            self.baseline_spread = recent.iter().sum::<f64>() / recent.len() as f64;
        }
    }

    pub fn update_trade(&mut self, now_s: f64, qty: f64) {
        self.trade_history.push_back((now_s, qty));
        self.evict(now_s);
        self.update_intensity_baseline(now_s);
    }

    pub fn update_depth(&mut self, now_s: f64, bid_qty: f64, ask_qty: f64) {
        let total = (bid_qty + ask_qty).max(1.0);
        let imbalance = (bid_qty - ask_qty) / total;
        self.imbalance_history.push_back((now_s, imbalance));
        self.evict(now_s);
    }

    pub fn update_price(&mut self, now_s: f64, mid: f64) {
        self.price_history.push_back((now_s, mid));
        self.evict(now_s);
    }

    fn evict(&mut self, now_s: f64) {
        // Trades keep a longer tail for the intensity baseline.
        let cutoff = now_s - self.config.window_s;
        let trade_cutoff = now_s - BASELINE_WINDOW_S;
        while self.spread_history.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.spread_history.pop_front();
        }
        while self.trade_history.front().is_some_and(|(ts, _)| *ts < trade_cutoff) {
            self.trade_history.pop_front();
        }
        while self.imbalance_history.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.imbalance_history.pop_front();
        }
        while self.price_history.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.price_history.pop_front();
        }
    }

    fn update_intensity_baseline(&mut self, now_s: f64) {
        if self.trade_history.len() < 10 {
            return;
        }
        let cutoff = now_s - BASELINE_WINDOW_S;
        let recent: Vec<(f64, f64)> =
            self.trade_history.iter().filter(|(ts, _)| *ts > cutoff).copied().collect();
        if recent.len() >= 5 {
            let total_qty: f64 = recent.iter().map(|(_, q)| q).sum();
            let span = (recent[recent.len() - 1].0 - recent[0].0).max(1.0);
            self.baseline_trade_intensity = total_qty / span;
        }
    }

    /// Spread compression relative to the rolling baseline, in [0, 1].
    pub fn spread_compression_score(&self) -> f64 {
        if self.spread_history.len() < MIN_SAMPLES {
            return 0.0;
        }
        let recent: Vec<f64> = self.spread_history.iter().rev().take(5).map(|(_, s)| *s).collect();
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        let ratio = avg / self.baseline_spread.max(1.0);
        (1.0 - ratio).clamp(0.0, 1.0)
    }

    /// Trade-rate surge over baseline; 4x baseline scores 1.
    pub fn trade_intensity_score(&self, now_s: f64) -> f64 {
        if self.trade_history.len() < MIN_SAMPLES || self.baseline_trade_intensity <= 0.0 {
            return 0.0;
        }
        let cutoff = now_s - INTENSITY_WINDOW_S;
        let recent: Vec<(f64, f64)> =
            self.trade_history.iter().filter(|(ts, _)| *ts > cutoff).copied().collect();
        if recent.len() < 2 {
            return 0.0;
        }
        let total_qty: f64 = recent.iter().map(|(_, q)| q).sum();
        let span = (recent[recent.len() - 1].0 - recent[0].0).max(1.0);
        let ratio = (total_qty / span) / self.baseline_trade_intensity;
        ((ratio - 1.0) / 3.0).clamp(0.0, 1.0)
    }

    /// Mean absolute depth imbalance; 50% lean scores 1.
    pub fn depth_imbalance_score(&self) -> f64 {
        if self.imbalance_history.len() < MIN_SAMPLES {
            return 0.0;
        }
        let recent: Vec<f64> =
            self.imbalance_history.iter().rev().take(5).map(|(_, i)| i.abs()).collect();
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        (avg * 2.0).min(1.0)
    }

    /// Price drift over the momentum window; a 1% move scores 1.
    pub fn momentum_score(&self, now_s: f64) -> f64 {
        if self.price_history.len() < 3 {
            return 0.0;
        }
        let cutoff = now_s - self.config.momentum_window_s;
        let recent: Vec<f64> =
            self.price_history.iter().filter(|(ts, _)| *ts > cutoff).map(|(_, p)| *p).collect();
        if recent.len() < 3 {
            return 0.0;
        }
        let start = recent[0];
        let end = recent[recent.len() - 1];
        let change = (end - start).abs() / start.max(1e-8);
        (change * 100.0).min(1.0)
    }

    /// Signed imbalance of the freshest observation, for the maker guard.
    pub fn current_imbalance(&self) -> f64 {
        self.imbalance_history.back().map(|(_, i)| *i).unwrap_or(0.0)
    }

    pub fn score(&self, now_s: f64) -> f64 {
        let score = self.spread_compression_score() * SPREAD_WEIGHT
            + self.trade_intensity_score(now_s) * INTENSITY_WEIGHT
            + self.depth_imbalance_score() * IMBALANCE_WEIGHT
            + self.momentum_score(now_s) * MOMENTUM_WEIGHT;
        score.clamp(0.0, 1.0)
    }

    /// Full analysis: score plus defense adjustments.
    pub fn analyze(&self, now_s: f64) -> ToxicityAnalysis {
        let score = self.score(now_s);
        let threshold = self.config.threshold;

        if score < threshold {
            // Calm flow: lean in a little.
            let analysis = ToxicityAnalysis {
                score,
                widen_bps: 0.0,
                size_scale: 1.0 + (threshold - score) * 0.2,
                ttl_scale: 1.0 + (threshold - score) * 0.3,
                defense_mode: false,
            };
            return analysis;
        }

        let excess = score - threshold;
        let widen_bps = excess * self.config.max_widen_bps / (1.0 - threshold);
        let size_scale =
            (-SIZE_DECAY_K * score).exp().clamp(self.config.min_size_scale, 1.0);
        let ttl_scale = (1.0 - excess * 0.5).max(self.config.min_ttl_scale);

        debug!(score, widen_bps, size_scale, ttl_scale, "toxicity defense active");
        ToxicityAnalysis { score, widen_bps, size_scale, ttl_scale, defense_mode: true }
    }
}
