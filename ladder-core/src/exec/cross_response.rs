//! Cross-response: immediate opposite-side reaction to own fills.
//!
//! A buy fill leans the book long, so the sell side must move first — and
//! fast. The directive shape is decided by inventory imbalance alone and
//! is precomputed per (side, layer) so the hot path is a cache lookup.
//! The executor interprets the directive against its live-order table.

use crate::core::{Layer, Side};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// What to do on the opposite side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentKind {
    /// Cancel-replace: move toward mid and upsize. Severe imbalance.
    Replace,
    /// Price-only move. Mild imbalance.
    Reprice,
    /// Refill the layer that traded. Balanced book.
    New,
}

/// Directive produced on a fill, consumed by the executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossDirective {
    pub kind: AdjustmentKind,
    /// Side to adjust (opposite of the fill).
    pub side: Side,
    /// Layer of the fill; Replace/Reprice act on L0 regardless.
    pub layer: Layer,
    /// Ticks to move toward mid.
    pub ticks: u32,
    pub size_mult: f64,
    pub urgency: f64,
}

const SEVERE_IMBALANCE: f64 = 0.10;
const MILD_IMBALANCE: f64 = 0.05;

fn classify(imbalance: f64) -> AdjustmentKind {
    if imbalance > SEVERE_IMBALANCE {
        AdjustmentKind::Replace
    } else if imbalance > MILD_IMBALANCE {
        AdjustmentKind::Reprice
    } else {
        AdjustmentKind::New
    }
}

fn build_directive(fill_side: Side, layer: Layer, imbalance: f64) -> CrossDirective {
    let side = fill_side.opposite();
    match classify(imbalance) {
        AdjustmentKind::Replace => CrossDirective {
            kind: AdjustmentKind::Replace,
            side,
            layer,
            ticks: 2,
            size_mult: 1.2,
            urgency: 0.9,
        },
        AdjustmentKind::Reprice => CrossDirective {
            kind: AdjustmentKind::Reprice,
            side,
            layer,
            ticks: 1,
            size_mult: 1.0,
            urgency: 0.5,
        },
        AdjustmentKind::New => CrossDirective {
            kind: AdjustmentKind::New,
            side,
            layer,
            ticks: 0,
            size_mult: 1.0,
            urgency: 0.3,
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDirective {
    directive: CrossDirective,
    computed_at: Instant,
    imbalance: f64,
}

/// Latency summary over the retained window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub samples: usize,
    pub slow_responses: u64,
}

pub struct CrossResponder {
    /// [side][layer] directive cache.
    cache: [[Option<CachedDirective>; 3]; 2],
    cache_ttl: Duration,
    target_ms: f64,
    latencies: VecDeque<f64>,
    slow_responses: u64,
    fill_events: u64,
}

impl CrossResponder {
    pub fn new(target_ms: u64) -> Self {
        Self {
            cache: [[None; 3]; 2],
            cache_ttl: Duration::from_secs(1),
            target_ms: target_ms as f64,
            latencies: VecDeque::with_capacity(1024),
            slow_responses: 0,
            fill_events: 0,
        }
    }

    /// Directive for a fill on `fill_side`/`layer` at the given imbalance.
    /// Cached per combination for one second; a change of imbalance regime
    /// invalidates the entry early.
    pub fn directive(&mut self, fill_side: Side, layer: Layer, imbalance: f64) -> CrossDirective {
        self.fill_events += 1;
        let si = match fill_side {
            Side::Buy => 0,
            Side::Sell => 1,
        };
        let li = layer.index();

        if let Some(cached) = self.cache[si][li] {
            let same_regime = classify(cached.imbalance) == classify(imbalance);
            if cached.computed_at.elapsed() < self.cache_ttl && same_regime {
                return cached.directive;
            }
        }

        let directive = build_directive(fill_side, layer, imbalance);
        self.cache[si][li] =
            Some(CachedDirective { directive, computed_at: Instant::now(), imbalance });
        directive
    }

    /// Precompute all six (side, layer) combinations at the current
    /// imbalance. Called from idle moments so fills hit a warm cache.
    pub fn precompute(&mut self, imbalance: f64) {
        for side in [Side::Buy, Side::Sell] {
            for layer in Layer::ALL {
                let si = match side {
                    Side::Buy => 0,
                    Side::Sell => 1,
                };
                self.cache[si][layer.index()] = Some(CachedDirective {
                    directive: build_directive(side, layer, imbalance),
                    computed_at: Instant::now(),
                    imbalance,
                });
            }
        }
    }

    /// Record a fill→repost latency observation.
    pub fn record_latency(&mut self, latency_ms: f64) {
        if self.latencies.len() == 1024 {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
        if latency_ms > self.target_ms {
            self.slow_responses += 1;
            warn!(latency_ms, target_ms = self.target_ms, "slow cross response");
        }
    }

    pub fn latency_summary(&self) -> LatencySummary {
        if self.latencies.is_empty() {
            return LatencySummary {
                mean_ms: 0.0,
                p50_ms: 0.0,
                p99_ms: 0.0,
                samples: 0,
                slow_responses: self.slow_responses,
            };
        }
        let mut sorted: Vec<f64> = self.latencies.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        LatencySummary {
            mean_ms: sorted.iter().sum::<f64>() / n as f64,
            p50_ms: sorted[n / 2],
            p99_ms: sorted[((n as f64 * 0.99) as usize).min(n - 1)],
            samples: n,
            slow_responses: self.slow_responses,
        }
    }

    pub fn fill_events(&self) -> u64 {
        self.fill_events
    }

    /// Latency health: p99 within target once enough samples exist.
    pub fn health_check(&self) -> bool {
        let summary = self.latency_summary();
        summary.samples < 10 || summary.p99_ms <= self.target_ms
    }
}
