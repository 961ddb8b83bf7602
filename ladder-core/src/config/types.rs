//! Engine configuration types.
//!
//! Everything tunable lives here; components receive the sub-struct they
//! need by value at construction and never read global state.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level engine configuration for one symbol instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    /// Equity the engine is allowed to commit, in quote units.
    pub target_equity: Decimal,
    /// Seconds of warm-up after start during which nothing is quoted.
    pub startup_delay_s: u64,
    /// Target base-asset value share.
    pub target_weight: f64,

    pub spread: SpreadConfig,
    pub layers: LayersConfig,
    pub governor: GovernorConfig,
    pub toxicity: ToxicityConfig,
    pub inventory: InventoryConfig,
    pub executor: ExecutorConfig,
    pub ledger: LedgerConfig,
    pub market_data: MarketDataConfig,
}

impl EngineConfig {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            bail!("symbol must not be empty");
        }
        if self.target_equity <= Decimal::ZERO {
            bail!("target_equity must be positive");
        }
        if !(0.0..=1.0).contains(&self.target_weight) {
            bail!("target_weight must lie in [0, 1]");
        }
        self.spread.validate()?;
        self.layers.validate()?;
        self.governor.validate()?;
        self.executor.validate()?;
        Ok(())
    }
}

/// Spread optimizer settings. Basis points throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadConfig {
    pub base_spread_bp: f64,
    pub spread_range_bp: (f64, f64),
    /// Hard floor; the EV gate can only raise the requirement above this.
    pub min_spread_bp: f64,
    /// Negative means the venue rebates makers.
    pub maker_fee_bp: f64,
    /// Adverse-selection multiplier applied to realized vol in the EV gate.
    pub adverse_selection_factor: f64,
    pub safety_ticks: u32,
    /// Realized vol (fraction per sample) above which safety ticks widen.
    pub high_vol_threshold: f64,
    /// Depth imbalance against a side beyond which safety ticks widen.
    pub adverse_imbalance_threshold: f64,
}

impl SpreadConfig {
    fn validate(&self) -> Result<()> {
        let (lo, hi) = self.spread_range_bp;
        if lo > hi {
            bail!("spread_range_bp: lo {} > hi {}", lo, hi);
        }
        if self.min_spread_bp <= 0.0 {
            bail!("min_spread_bp must be positive");
        }
        Ok(())
    }
}

/// Per-layer ladder settings plus slot bounds for the depth controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayersConfig {
    pub l0_slots: (u32, u32),
    pub l1_slots: (u32, u32),
    pub base_l1_slots: u32,
    pub max_total_slots: u32,
    pub l0_ttl_ms: (u64, u64),
    pub l1_ttl_s: u64,
    pub l2_ttl_s: u64,
    /// Extra TTL jitter range, seconds.
    pub jitter_s: (f64, f64),
    /// Notional share per layer in a burst deploy; must sum to 1.
    pub burst_allocation: [f64; 3],
    /// Distance between sub-orders of one layer, fraction of a bp.
    pub stagger_bp: f64,
    /// Per-order size variance, +/- fraction.
    pub size_variance: f64,
    pub spread_sensitivity: f64,
    pub liquidity_sensitivity: f64,
}

impl LayersConfig {
    fn validate(&self) -> Result<()> {
        if self.l0_slots.0 > self.l0_slots.1 || self.l1_slots.0 > self.l1_slots.1 {
            bail!("slot ranges must be ordered");
        }
        let sum: f64 = self.burst_allocation.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            bail!("burst_allocation must sum to 1, got {}", sum);
        }
        Ok(())
    }

    /// Midpoint of the configured L0 TTL range, before jitter.
    pub fn l0_base_ttl_ms(&self) -> u64 {
        (self.l0_ttl_ms.0 + self.l0_ttl_ms.1) / 2
    }
}

/// Budget governor and rate-limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    pub usage_target_pct: f64,
    pub usage_safe_pct: f64,
    pub min_budgets: (u32, u32, u32),
    pub max_budgets: (u32, u32, u32),
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Integrator clamp, +/- units of percent-seconds.
    pub integrator_limit: f64,
    /// Sigmoid slope for the buy/sell fill split.
    pub side_split_gamma: f64,
    /// Venue weight reading that trips the cooldown fuse.
    pub weight_danger_threshold: u32,
    pub weight_limit: u32,
    pub cooldown_s: u64,
}

impl GovernorConfig {
    fn validate(&self) -> Result<()> {
        if self.usage_safe_pct < self.usage_target_pct {
            bail!("usage_safe_pct must be >= usage_target_pct");
        }
        if self.weight_danger_threshold > self.weight_limit {
            bail!("weight_danger_threshold above weight_limit");
        }
        Ok(())
    }
}

/// Toxicity filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToxicityConfig {
    pub window_s: f64,
    pub momentum_window_s: f64,
    pub threshold: f64,
    pub max_widen_bps: f64,
    pub min_size_scale: f64,
    pub min_ttl_scale: f64,
}

/// Proactive inventory allocator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub alpha_base: f64,
    pub k_factor: f64,
    pub alpha_min: f64,
    pub alpha_max: f64,
    /// Dead band on |error| inside which both multipliers stay 1.
    pub error_threshold: f64,
}

/// Batch executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub micro_batch_ms: (u64, u64),
    pub burst_size: usize,
    pub ttl_sweep_interval_ms: u64,
    /// Free cash above this triggers a burst deploy.
    pub min_deployable_notional: Decimal,
    /// Deployment ratio above which burst deploys are suppressed.
    pub max_deployment_ratio: f64,
    pub wave_interval_ms: u64,
    pub max_waves: usize,
    /// Outbound call soft timeout.
    pub request_timeout_ms: u64,
    /// Seconds a layer stays locked after a filter reject.
    pub filter_reject_lockout_s: u64,
    pub cross_response_target_ms: u64,
}

impl ExecutorConfig {
    fn validate(&self) -> Result<()> {
        if self.micro_batch_ms.0 > self.micro_batch_ms.1 {
            bail!("micro_batch_ms range must be ordered");
        }
        if self.burst_size == 0 {
            bail!("burst_size must be at least 1");
        }
        Ok(())
    }
}

/// Shadow ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Share of every balance withheld from availability checks.
    pub reserve_ratio: f64,
    pub reconcile_interval_s: u64,
    /// Relative deviation beyond which the ledger force-syncs to truth.
    pub deviation_threshold_pct: f64,
    /// Events retained in memory for replay.
    pub max_events_in_memory: usize,
}

/// Dual-path market data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    pub primary_max_age_ms: u64,
    pub secondary_max_age_ms: u64,
    /// VWAP window on the trade tape.
    pub vwap_window_ms: u64,
    /// Half-spread assumed when synthesizing a book around VWAP, bp.
    pub synthetic_half_spread_bp: f64,
}
