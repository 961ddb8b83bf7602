//! Layered quote planner.
//!
//! Pulls the whole decision pipeline together: volatility, toxicity,
//! depth allocation, spread optimization and inventory-aware sizing feed
//! one ladder of post-only orders across L0/L1/L2.

use crate::depth::{AdaptiveDepth, DepthAllocation};
use crate::inventory::InventoryAllocator;
use crate::spread::SpreadOptimizer;
use crate::toxicity::ToxicityFilter;
use crate::volatility::RollingVolatility;
use ladder_core::config::EngineConfig;
use ladder_core::core::TopOfBook;
use ladder_core::engine::{ConcurrencyTargets, QuoteInputs, Quoter};
use ladder_core::risk::{pretrade_sanitize, GuardContext, MakerGuard};
use ladder_core::utils::ids::new_client_order_id;
use ladder_core::{Layer, MarketSnapshot, PlannedOrder, Side};
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Distance multiplier per layer on the optimal spread.
const LAYER_SPREAD_FACTOR: [f64; 3] = [1.0, 2.0, 3.5];
/// Share of target equity kept quoted.
const TARGET_UTILIZATION: f64 = 0.10;
/// Fraction of target equity under which buy sizes start shrinking.
const CASH_FLOOR_FRACTION: f64 = 0.05;

/// Soft fill-gate: decays toward a floor instead of a hard block as the
/// side's window budget fills up.
pub fn fill_gate_scale(planned: u32, cap: u32, floor: f64) -> f64 {
    if cap == 0 {
        return floor;
    }
    let ratio = (planned as f64 / cap as f64).min(1.0);
    (1.0 - ratio).max(floor)
}

/// Soft cash floor: buy sizes shrink as free quote approaches the floor,
/// never to zero.
pub fn cash_floor_scale(free_quote: f64, floor: f64, min_scale: f64) -> f64 {
    if free_quote >= floor {
        return 1.0;
    }
    let gap = (floor - free_quote).max(0.0);
    (1.0 - gap / floor.max(1e-9)).max(min_scale)
}

pub struct LayeredQuoter {
    config: EngineConfig,
    guard: MakerGuard,
    volatility: RollingVolatility,
    toxicity: ToxicityFilter,
    depth: AdaptiveDepth,
    spread: SpreadOptimizer,
    inventory: InventoryAllocator,
    lockouts: HashMap<(Side, Layer), Instant>,
    lockout_duration: Duration,
    last_allocation: DepthAllocation,
    now_s: f64,
}

impl LayeredQuoter {
    pub fn new(config: EngineConfig) -> Self {
        let guard = MakerGuard::new(
            config.spread.safety_ticks,
            config.spread.high_vol_threshold,
            config.spread.adverse_imbalance_threshold,
        );
        let depth = AdaptiveDepth::new(config.layers.clone(), config.spread.spread_range_bp.1);
        let toxicity = ToxicityFilter::new(config.toxicity.clone());
        let spread = SpreadOptimizer::new(config.spread.clone());
        let inventory = InventoryAllocator::new(config.inventory.clone());
        let lockout_duration = Duration::from_secs(config.executor.filter_reject_lockout_s);
        let (min_l0, _) = config.layers.l0_slots;
        Self {
            guard,
            volatility: RollingVolatility::new(100, 10),
            toxicity,
            depth,
            spread,
            inventory,
            lockouts: HashMap::new(),
            lockout_duration,
            last_allocation: DepthAllocation {
                l0_slots_per_side: min_l0,
                l1_slots_per_side: config.layers.base_l1_slots,
                spread_pressure: 0.5,
                liquidity_pressure: 0.5,
                gate_pressure: 0.0,
            },
            now_s: 0.0,
            config,
        }
    }

    fn locked_out(&self, side: Side, layer: Layer) -> bool {
        self.lockouts
            .get(&(side, layer))
            .is_some_and(|until| Instant::now() < *until)
    }

    fn ttl_for(&self, layer: Layer, ttl_scale: f64) -> u64 {
        let base_ms = match layer {
            Layer::L0 => self.config.layers.l0_base_ttl_ms(),
            Layer::L1 => self.config.layers.l1_ttl_s * 1000,
            Layer::L2 => self.config.layers.l2_ttl_s * 1000,
        };
        let (jitter_lo, jitter_hi) = self.config.layers.jitter_s;
        let jitter_ms =
            rand::thread_rng().gen_range((jitter_lo * 1000.0) as u64..=(jitter_hi * 1000.0) as u64);
        (base_ms as f64 * ttl_scale) as u64 + jitter_ms
    }

    fn slots_for(&self, layer: Layer, degraded: bool, allocation: &DepthAllocation) -> u32 {
        if degraded && layer != Layer::L0 {
            // Defensive mode keeps only the inner layer.
            return 0;
        }
        match layer {
            Layer::L0 => allocation.l0_slots_per_side.max(1),
            Layer::L1 => allocation.l1_slots_per_side,
            Layer::L2 => {
                if allocation.gate_pressure > 0.7 {
                    0
                } else {
                    1
                }
            }
        }
    }

    /// Build one side of the ladder.
    #[allow(clippy::too_many_arguments)]
    fn plan_side(
        &mut self,
        side: Side,
        inputs: &QuoteInputs<'_>,
        top: &TopOfBook,
        allocation: &DepthAllocation,
        widen_bps: f64,
        size_scale: f64,
        side_mult: f64,
        ttl_scale: f64,
        out: &mut Vec<PlannedOrder>,
    ) {
        let mid_f = inputs.snapshot.mid.to_f64().unwrap_or(0.0);
        if mid_f <= 0.0 {
            return;
        }
        let vol = self.volatility.value();
        let half_spread = self.spread.half_spread_fraction(side, vol);
        let widen = widen_bps / 10_000.0;

        let side_budget = inputs.budgets.side_fill_budget(side).max(1);
        let mut planned_on_side: u32 = 0;

        let free_quote_f = inputs.free_quote.to_f64().unwrap_or(0.0);
        let cash_scale = if side == Side::Buy {
            let floor =
                self.config.target_equity.to_f64().unwrap_or(0.0) * CASH_FLOOR_FRACTION;
            cash_floor_scale(free_quote_f, floor, 0.15)
        } else {
            1.0
        };

        let equity = self.config.target_equity.to_f64().unwrap_or(0.0);
        let mut spent_quote = Decimal::ZERO;
        let mut spent_base = Decimal::ZERO;

        for layer in Layer::ALL {
            if self.locked_out(side, layer) {
                trace!(%side, %layer, "layer locked out");
                continue;
            }
            let count = self.slots_for(layer, inputs.degraded, allocation);
            if count == 0 {
                continue;
            }

            let offset = (half_spread + widen / 2.0) * LAYER_SPREAD_FACTOR[layer.index()];
            let center = match side {
                Side::Buy => mid_f * (1.0 - offset),
                Side::Sell => mid_f * (1.0 + offset),
            };

            let layer_notional = equity
                * TARGET_UTILIZATION
                * self.config.layers.burst_allocation[layer.index()]
                / 2.0;
            let per_order_notional = layer_notional / count as f64;

            for i in 0..count {
                if planned_on_side >= side_budget {
                    break;
                }
                // Gentle size decay as the window budget fills up.
                let gate_scale = fill_gate_scale(planned_on_side, side_budget, 0.30);

                // Deterministic size variance and micro price stagger.
                let variance = 1.0 - self.config.layers.size_variance
                    + (i as f64 / count as f64) * 2.0 * self.config.layers.size_variance;
                let stagger = 1.0
                    + (i as f64 - count as f64 / 2.0) * self.config.layers.stagger_bp / 10_000.0;

                let notional =
                    per_order_notional * variance * size_scale * side_mult * cash_scale * gate_scale;
                if notional <= 0.0 {
                    continue;
                }
                let qty = Decimal::from_f64(notional / center).unwrap_or(Decimal::ZERO);
                let price = Decimal::from_f64(center * stagger).unwrap_or(Decimal::ZERO);
                if qty <= Decimal::ZERO || price <= Decimal::ZERO {
                    continue;
                }

                let sanitized = match pretrade_sanitize(
                    side,
                    price,
                    qty,
                    inputs.filters,
                    top,
                    &self.guard,
                    self.guard_context(),
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        trace!(%side, %layer, error = %e, "order dropped at sanitize");
                        continue;
                    }
                };

                // Never plan past the spendable balances.
                match side {
                    Side::Buy => {
                        if spent_quote + sanitized.notional > inputs.free_quote {
                            continue;
                        }
                        spent_quote += sanitized.notional;
                    }
                    Side::Sell => {
                        if spent_base + sanitized.qty > inputs.free_base {
                            continue;
                        }
                        spent_base += sanitized.qty;
                    }
                }

                out.push(PlannedOrder {
                    side,
                    price: sanitized.price,
                    qty: sanitized.qty,
                    layer,
                    ttl_ms: self.ttl_for(layer, ttl_scale),
                    client_order_id: new_client_order_id(side, layer),
                    post_only: true,
                });
                planned_on_side += 1;
            }
        }
    }
}

impl Quoter for LayeredQuoter {
    fn observe_tick(&mut self, snapshot: &MarketSnapshot) {
        self.now_s = snapshot.ts_ns as f64 / 1e9;
        let mid = snapshot.mid.to_f64().unwrap_or(0.0);
        self.volatility.add_price(mid);
        self.toxicity.update_price(self.now_s, mid);
        self.toxicity.update_spread(self.now_s, snapshot.spread_bps);
    }

    fn observe_trade(&mut self, _price: Decimal, qty: Decimal, ts_ns: u64) {
        self.now_s = ts_ns as f64 / 1e9;
        self.toxicity.update_trade(self.now_s, qty.to_f64().unwrap_or(0.0));
    }

    fn observe_depth(&mut self, bid_qty: Decimal, ask_qty: Decimal) {
        let bid = bid_qty.to_f64().unwrap_or(0.0);
        let ask = ask_qty.to_f64().unwrap_or(0.0);
        self.toxicity.update_depth(self.now_s, bid, ask);
        let total = (bid + ask).max(1.0);
        self.spread.update_flow((bid - ask) / total);
    }

    fn on_filter_reject(&mut self, side: Side, layer: Layer) {
        self.lockouts
            .insert((side, layer), Instant::now() + self.lockout_duration);
        debug!(%side, %layer, lockout_s = self.lockout_duration.as_secs(), "layer locked out");
    }

    fn plan(&mut self, inputs: &QuoteInputs<'_>) -> Vec<PlannedOrder> {
        let snapshot = inputs.snapshot;

        // The maker guard needs a book; synthesize one off the snapshot
        // when only the fused view exists.
        let top = inputs.top.unwrap_or(TopOfBook {
            bid: snapshot.bid,
            ask: snapshot.ask,
            bid_qty: Decimal::ZERO,
            ask_qty: Decimal::ZERO,
            last_update_ns: snapshot.ts_ns,
        });

        self.depth.update_market(
            self.now_s,
            snapshot.spread_bps,
            top.bid_qty.to_f64().unwrap_or(0.0),
            top.ask_qty.to_f64().unwrap_or(0.0),
        );
        self.depth.update_gate(
            self.now_s,
            inputs.budgets.fill_10s_buy as f64,
            inputs.budgets.fill_10s_sell as f64,
        );
        let allocation = self.depth.allocate();
        self.last_allocation = allocation;

        let tox = self.toxicity.analyze(self.now_s);
        let (widen_bps, mut size_scale) = if inputs.degraded {
            (self.config.toxicity.max_widen_bps, tox.size_scale * 0.5)
        } else {
            (tox.widen_bps, tox.size_scale)
        };
        size_scale = size_scale.max(0.0);

        let mults = self.inventory.multipliers(inputs.inventory);
        let ttl_scale = (inputs.budgets.ttl_scale * tox.ttl_scale).clamp(0.4, 2.0);

        let mut out = Vec::new();
        self.plan_side(
            Side::Buy,
            inputs,
            &top,
            &allocation,
            widen_bps,
            size_scale,
            mults.buy,
            ttl_scale,
            &mut out,
        );
        self.plan_side(
            Side::Sell,
            inputs,
            &top,
            &allocation,
            widen_bps,
            size_scale,
            mults.sell,
            ttl_scale,
            &mut out,
        );

        debug!(
            orders = out.len(),
            tox = tox.score,
            l0 = allocation.l0_slots_per_side,
            l1 = allocation.l1_slots_per_side,
            "ladder planned"
        );
        out
    }

    fn concurrency_targets(&self) -> ConcurrencyTargets {
        let alloc = &self.last_allocation;
        let l2 = if alloc.gate_pressure > 0.7 { 0 } else { 1 };
        ConcurrencyTargets {
            n_l0: alloc.l0_slots_per_side * 2,
            n_l1: alloc.l1_slots_per_side * 2,
            n_l2: l2 * 2,
            ttl_l0_s: self.config.layers.l0_base_ttl_ms() as f64 / 1000.0,
            ttl_l1_s: self.config.layers.l1_ttl_s as f64,
            ttl_l2_s: self.config.layers.l2_ttl_s as f64,
        }
    }

    fn guard_context(&self) -> GuardContext {
        GuardContext {
            volatility: self.volatility.value(),
            depth_imbalance: self.toxicity.current_imbalance(),
        }
    }

    fn name(&self) -> &'static str {
        "layered"
    }
}
