//! Named configuration profiles.
//!
//! `default_profile` mirrors the production tuning for a thick low-priced
//! pair (DOGE-class tick of 1e-5, step of 1). The conservative and
//! aggressive variants only move the knobs operators actually touch.

use super::types::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Production defaults.
pub fn default_profile(symbol: &str, target_equity: Decimal) -> EngineConfig {
    EngineConfig {
        symbol: symbol.to_string(),
        target_equity,
        startup_delay_s: 5,
        target_weight: 0.5,
        spread: SpreadConfig {
            base_spread_bp: 4.0,
            spread_range_bp: (3.0, 8.0),
            min_spread_bp: 3.0,
            maker_fee_bp: -4.0,
            adverse_selection_factor: 0.8,
            safety_ticks: 2,
            high_vol_threshold: 0.005,
            adverse_imbalance_threshold: 0.3,
        },
        layers: LayersConfig {
            l0_slots: (2, 4),
            l1_slots: (0, 4),
            base_l1_slots: 2,
            max_total_slots: 12,
            l0_ttl_ms: (1800, 2500),
            l1_ttl_s: 8,
            l2_ttl_s: 20,
            jitter_s: (0.5, 1.0),
            burst_allocation: [0.70, 0.25, 0.05],
            stagger_bp: 0.1,
            size_variance: 0.2,
            spread_sensitivity: 2.0,
            liquidity_sensitivity: 1.5,
        },
        governor: GovernorConfig {
            usage_target_pct: 10.0,
            usage_safe_pct: 15.0,
            min_budgets: (2, 2, 20),
            max_budgets: (20, 20, 80),
            kp: 0.06,
            ki: 0.015,
            kd: 0.001,
            integrator_limit: 50.0,
            side_split_gamma: 1.0,
            weight_danger_threshold: 900,
            weight_limit: 1200,
            cooldown_s: 60,
        },
        toxicity: ToxicityConfig {
            window_s: 30.0,
            momentum_window_s: 5.0,
            threshold: 0.6,
            max_widen_bps: 15.0,
            min_size_scale: 0.3,
            min_ttl_scale: 0.5,
        },
        inventory: InventoryConfig {
            alpha_base: 0.15,
            k_factor: 2.0,
            alpha_min: 0.10,
            alpha_max: 0.35,
            error_threshold: 0.05,
        },
        executor: ExecutorConfig {
            micro_batch_ms: (20, 50),
            burst_size: 10,
            ttl_sweep_interval_ms: 100,
            min_deployable_notional: dec!(50),
            max_deployment_ratio: 0.7,
            wave_interval_ms: 50,
            max_waves: 3,
            request_timeout_ms: 2000,
            filter_reject_lockout_s: 10,
            cross_response_target_ms: 50,
        },
        ledger: LedgerConfig {
            reserve_ratio: 0.02,
            reconcile_interval_s: 30,
            deviation_threshold_pct: 0.1,
            max_events_in_memory: 10_000,
        },
        market_data: MarketDataConfig {
            primary_max_age_ms: 500,
            secondary_max_age_ms: 1000,
            vwap_window_ms: 1000,
            synthetic_half_spread_bp: 1.0,
        },
    }
}

/// Wider spreads, smaller budgets, shorter leash.
pub fn conservative(symbol: &str, target_equity: Decimal) -> EngineConfig {
    let mut cfg = default_profile(symbol, target_equity);
    cfg.spread.base_spread_bp = 6.0;
    cfg.spread.spread_range_bp = (5.0, 12.0);
    cfg.spread.min_spread_bp = 5.0;
    cfg.spread.safety_ticks = 3;
    cfg.governor.usage_target_pct = 6.0;
    cfg.governor.usage_safe_pct = 10.0;
    cfg.governor.max_budgets = (10, 10, 40);
    cfg.layers.l1_slots = (0, 2);
    cfg.layers.base_l1_slots = 1;
    cfg
}

/// Tighter spreads and bigger budgets. For venues with deep books only.
pub fn aggressive(symbol: &str, target_equity: Decimal) -> EngineConfig {
    let mut cfg = default_profile(symbol, target_equity);
    cfg.spread.base_spread_bp = 3.5;
    cfg.governor.usage_target_pct = 12.0;
    cfg.governor.max_budgets = (30, 30, 100);
    cfg.layers.l0_slots = (3, 5);
    cfg.layers.max_total_slots = 16;
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_profiles_validate() {
        for cfg in [
            default_profile("DOGEUSDT", dec!(1000)),
            conservative("DOGEUSDT", dec!(1000)),
            aggressive("DOGEUSDT", dec!(1000)),
        ] {
            cfg.validate().expect("profile must validate");
        }
    }

    #[test]
    fn conservative_is_wider_than_default() {
        let d = default_profile("DOGEUSDT", dec!(1000));
        let c = conservative("DOGEUSDT", dec!(1000));
        assert!(c.spread.base_spread_bp > d.spread.base_spread_bp);
        assert!(c.governor.usage_safe_pct <= d.governor.usage_safe_pct);
    }
}
