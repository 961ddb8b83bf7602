//! Proactive inventory-aware sizing.
//!
//! The further the book drifts from its target weight, the harder the
//! deficit side leans in and the softer the surplus side quotes. The
//! aggressiveness parameter grows with the error so convergence is
//! geometric rather than asymptotic.

use ladder_core::config::InventoryConfig;
use ladder_core::InventoryState;
use std::collections::VecDeque;
use tracing::debug;

const MULT_MIN: f64 = 0.1;
const MULT_MAX: f64 = 3.0;
const HISTORY_CAP: usize = 100;

/// Buy/sell size multipliers for one planning pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeMultipliers {
    pub buy: f64,
    pub sell: f64,
}

impl SizeMultipliers {
    pub const NEUTRAL: SizeMultipliers = SizeMultipliers { buy: 1.0, sell: 1.0 };
}

#[derive(Debug, Clone, Copy)]
struct ConvergenceStep {
    error: f64,
    alpha: f64,
}

/// Convergence telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceReport {
    pub steps: usize,
    pub current_error: f64,
    pub current_alpha: f64,
    /// Recent steps satisfy the 0.8-contraction requirement.
    pub converging: bool,
}

pub struct InventoryAllocator {
    config: InventoryConfig,
    history: VecDeque<ConvergenceStep>,
}

impl InventoryAllocator {
    pub fn new(config: InventoryConfig) -> Self {
        Self { config, history: VecDeque::with_capacity(HISTORY_CAP) }
    }

    /// Aggressiveness grows linearly with |error|, clamped to its band.
    pub fn dynamic_alpha(&self, error: f64) -> f64 {
        (self.config.alpha_base + self.config.k_factor * error.abs())
            .clamp(self.config.alpha_min, self.config.alpha_max)
    }

    /// Multipliers for the current inventory state. Records a convergence
    /// step as a side effect.
    pub fn multipliers(&mut self, inventory: &InventoryState) -> SizeMultipliers {
        let error = inventory.error();
        let alpha = self.dynamic_alpha(error);
        let threshold = self.config.error_threshold;

        let mult = if error.abs() < threshold {
            SizeMultipliers::NEUTRAL
        } else if error > 0.0 {
            // Short of base: buy bigger, sell smaller.
            SizeMultipliers {
                buy: (1.0 + alpha * error.abs()).clamp(MULT_MIN, MULT_MAX),
                sell: (1.0 - alpha * error.abs() * 0.5).clamp(MULT_MIN, MULT_MAX),
            }
        } else {
            SizeMultipliers {
                buy: (1.0 - alpha * error.abs() * 0.5).clamp(MULT_MIN, MULT_MAX),
                sell: (1.0 + alpha * error.abs()).clamp(MULT_MIN, MULT_MAX),
            }
        };

        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(ConvergenceStep { error, alpha });
        debug!(error, alpha, buy = mult.buy, sell = mult.sell, "inventory sizing");
        mult
    }

    /// Validate the contraction property over the recent steps: each
    /// meaningful error shrinks to under 80% of its predecessor.
    pub fn convergence_report(&self) -> ConvergenceReport {
        let (current_error, current_alpha) = self
            .history
            .back()
            .map(|s| (s.error, s.alpha))
            .unwrap_or((0.0, self.config.alpha_base));

        let recent: Vec<&ConvergenceStep> = self.history.iter().rev().take(3).collect();
        let mut converging = self.history.len() >= 2;
        for pair in recent.windows(2) {
            let newer = pair[0].error.abs();
            let older = pair[1].error.abs();
            if older > 0.01 && newer >= 0.8 * older {
                converging = false;
            }
        }

        ConvergenceReport {
            steps: self.history.len(),
            current_error,
            current_alpha,
            converging,
        }
    }
}
