//! Pre-trade quantizer and maker-guard.
//!
//! Every order leaving the engine passes through `pretrade_sanitize`: the
//! price lands exactly on a tick rounded away from mid, the quantity lands
//! exactly on a step at or above the venue minimums, and the price clears
//! the opposite top of book by the safety margin so a post-only submit
//! cannot cross.

use crate::core::{Side, SymbolFilters, TopOfBook};
use rust_decimal::Decimal;
use thiserror::Error;

/// Rejection reasons. None of these are retried at this level; the planner
/// receives them as per-layer constraints.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterReject {
    #[error("price {price} outside venue bounds [{min}, {max}]")]
    PriceOutOfRange { price: Decimal, min: Decimal, max: Decimal },
    #[error("qty {qty} above venue maximum {max}")]
    QtyAboveMax { qty: Decimal, max: Decimal },
    #[error("cannot reach min notional {min_notional} at price {price} within qty cap {max_qty}")]
    NotionalUnreachable { price: Decimal, min_notional: Decimal, max_qty: Decimal },
    #[error("non-positive input: price={price} qty={qty}")]
    NonPositiveInput { price: Decimal, qty: Decimal },
}

/// Sanitized order parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sanitized {
    pub price: Decimal,
    pub qty: Decimal,
    pub notional: Decimal,
    /// Safety ticks that ended up applied, for telemetry.
    pub safety_ticks: u32,
}

/// Quantize a price onto the tick grid, rounding away from mid for the
/// given side (down for buys, up for sells).
pub fn quantize_price(side: Side, price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    let steps = price / tick;
    let steps = match side {
        Side::Buy => steps.floor(),
        Side::Sell => steps.ceil(),
    };
    steps * tick
}

/// Quantize a quantity down onto the step grid.
pub fn quantize_qty(qty: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return qty;
    }
    (qty / step).floor() * step
}

/// Smallest step multiple whose notional at `price` reaches `min_notional`.
pub fn min_qty_for_notional(price: Decimal, min_notional: Decimal, step: Decimal) -> Decimal {
    if price <= Decimal::ZERO || step <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let per_step = price * step;
    let mut steps = (min_notional / per_step).ceil();
    if steps * per_step < min_notional {
        steps += Decimal::ONE;
    }
    steps * step
}

/// Market context feeding the dynamic safety margin.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardContext {
    /// Short-horizon realized vol as a fraction (not bp).
    pub volatility: f64,
    /// Signed depth imbalance (bid - ask) / (bid + ask), in [-1, 1].
    pub depth_imbalance: f64,
}

/// Maker-guard: keeps passive prices clear of the touch.
#[derive(Debug, Clone, Copy)]
pub struct MakerGuard {
    pub base_safety_ticks: u32,
    pub high_vol_threshold: f64,
    pub adverse_imbalance_threshold: f64,
}

impl MakerGuard {
    pub fn new(
        base_safety_ticks: u32,
        high_vol_threshold: f64,
        adverse_imbalance_threshold: f64,
    ) -> Self {
        Self { base_safety_ticks, high_vol_threshold, adverse_imbalance_threshold }
    }

    /// Safety margin in ticks, widened by one (capped at 3) under elevated
    /// vol or when depth leans against the side.
    pub fn safety_ticks(&self, side: Side, ctx: GuardContext) -> u32 {
        let mut ticks = self.base_safety_ticks;
        let adverse = match side {
            Side::Sell => ctx.depth_imbalance < -self.adverse_imbalance_threshold,
            Side::Buy => ctx.depth_imbalance > self.adverse_imbalance_threshold,
        };
        if ctx.volatility > self.high_vol_threshold || adverse {
            ticks = (ticks + 1).min(3);
        }
        ticks
    }

    /// Snap a quantized price to the safe side of the touch. Returns the
    /// price unchanged when it already clears the margin.
    pub fn guard_price(
        &self,
        side: Side,
        price: Decimal,
        top: &TopOfBook,
        tick: Decimal,
        ticks: u32,
    ) -> Decimal {
        let margin = tick * Decimal::from(ticks);
        match side {
            Side::Sell => {
                let floor = top.ask + margin;
                if price < floor {
                    quantize_price(Side::Sell, floor, tick)
                } else {
                    price
                }
            }
            Side::Buy => {
                let cap = top.bid - margin;
                if price > cap {
                    quantize_price(Side::Buy, cap, tick)
                } else {
                    price
                }
            }
        }
    }
}

/// Full pre-trade pipeline: quantize, enforce minimums, guard the price,
/// and verify venue bounds.
pub fn pretrade_sanitize(
    side: Side,
    desired_price: Decimal,
    desired_qty: Decimal,
    filters: &SymbolFilters,
    top: &TopOfBook,
    guard: &MakerGuard,
    ctx: GuardContext,
) -> Result<Sanitized, FilterReject> {
    if desired_price <= Decimal::ZERO || desired_qty <= Decimal::ZERO {
        return Err(FilterReject::NonPositiveInput { price: desired_price, qty: desired_qty });
    }

    let mut price = quantize_price(side, desired_price, filters.tick_size);

    let ticks = guard.safety_ticks(side, ctx);
    price = guard.guard_price(side, price, top, filters.tick_size, ticks);

    if price < filters.min_price || price > filters.max_price || price <= Decimal::ZERO {
        return Err(FilterReject::PriceOutOfRange {
            price,
            min: filters.min_price,
            max: filters.max_price,
        });
    }

    let mut qty = quantize_qty(desired_qty, filters.step_size);
    if qty < filters.min_qty {
        qty = quantize_qty(filters.min_qty, filters.step_size).max(filters.min_qty);
    }

    if price * qty < filters.min_notional {
        qty = min_qty_for_notional(price, filters.min_notional, filters.step_size);
    }

    if qty > filters.max_qty {
        if price * filters.max_qty < filters.min_notional {
            return Err(FilterReject::NotionalUnreachable {
                price,
                min_notional: filters.min_notional,
                max_qty: filters.max_qty,
            });
        }
        return Err(FilterReject::QtyAboveMax { qty, max: filters.max_qty });
    }

    Ok(Sanitized { price, qty, notional: price * qty, safety_ticks: ticks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            tick_size: dec!(0.00001),
            step_size: dec!(1),
            min_qty: dec!(1),
            max_qty: dec!(1000000),
            min_notional: dec!(1),
            min_price: dec!(0.00001),
            max_price: dec!(1000),
        }
    }

    fn top() -> TopOfBook {
        TopOfBook {
            bid: dec!(0.26398),
            ask: dec!(0.26402),
            bid_qty: dec!(1000),
            ask_qty: dec!(900),
            last_update_ns: 0,
        }
    }

    fn guard() -> MakerGuard {
        MakerGuard::new(2, 0.005, 0.3)
    }

    #[test]
    fn price_rounds_away_from_mid() {
        let tick = dec!(0.00001);
        assert_eq!(quantize_price(Side::Buy, dec!(0.263951), tick), dec!(0.26395));
        assert_eq!(quantize_price(Side::Sell, dec!(0.264051), tick), dec!(0.26406));
    }

    #[test]
    fn quantize_is_idempotent() {
        let tick = dec!(0.00001);
        for side in [Side::Buy, Side::Sell] {
            let once = quantize_price(side, dec!(0.2639567), tick);
            assert_eq!(quantize_price(side, once, tick), once);
        }
        let step = dec!(1);
        let q = quantize_qty(dec!(50.7), step);
        assert_eq!(quantize_qty(q, step), q);
    }

    #[test]
    fn sell_price_clears_ask_by_safety_margin() {
        let s = pretrade_sanitize(
            Side::Sell,
            dec!(0.26390), // below the ask on purpose
            dec!(50),
            &filters(),
            &top(),
            &guard(),
            GuardContext::default(),
        )
        .unwrap();
        assert!(s.price >= dec!(0.26402) + dec!(0.00002));
        assert_eq!(s.safety_ticks, 2);
    }

    #[test]
    fn buy_price_stays_below_bid_by_safety_margin() {
        let s = pretrade_sanitize(
            Side::Buy,
            dec!(0.26402),
            dec!(50),
            &filters(),
            &top(),
            &guard(),
            GuardContext::default(),
        )
        .unwrap();
        assert!(s.price <= dec!(0.26398) - dec!(0.00002));
    }

    #[test]
    fn safety_ticks_widen_on_high_vol_and_adverse_depth() {
        let g = guard();
        let calm = GuardContext::default();
        assert_eq!(g.safety_ticks(Side::Sell, calm), 2);

        let hot = GuardContext { volatility: 0.01, depth_imbalance: 0.0 };
        assert_eq!(g.safety_ticks(Side::Sell, hot), 3);

        let ask_heavy = GuardContext { volatility: 0.0, depth_imbalance: -0.4 };
        assert_eq!(g.safety_ticks(Side::Sell, ask_heavy), 3);
        // Same lean is not adverse to a buy.
        assert_eq!(g.safety_ticks(Side::Buy, ask_heavy), 2);
    }

    #[test]
    fn qty_snaps_to_min_and_notional_tops_up() {
        let mut f = filters();
        f.min_notional = dec!(5);
        let s = pretrade_sanitize(
            Side::Buy,
            dec!(0.26395),
            dec!(0.4), // below min_qty, then below min_notional
            &f,
            &top(),
            &guard(),
            GuardContext::default(),
        )
        .unwrap();
        assert_eq!(s.qty, dec!(19)); // 19 * 0.26395 = 5.01505
        assert!(s.notional >= f.min_notional);
        assert_eq!(s.qty % f.step_size, Decimal::ZERO);
    }

    #[test]
    fn price_out_of_range_rejected() {
        let mut f = filters();
        f.max_price = dec!(0.1);
        let err = pretrade_sanitize(
            Side::Sell,
            dec!(0.26410),
            dec!(50),
            &f,
            &top(),
            &guard(),
            GuardContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FilterReject::PriceOutOfRange { .. }));
    }

    #[test]
    fn unreachable_notional_rejected() {
        let mut f = filters();
        f.max_qty = dec!(2);
        f.min_notional = dec!(10);
        let err = pretrade_sanitize(
            Side::Buy,
            dec!(0.26395),
            dec!(1),
            &f,
            &top(),
            &guard(),
            GuardContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FilterReject::NotionalUnreachable { .. }));
    }

    #[test]
    fn non_positive_inputs_rejected() {
        let err = pretrade_sanitize(
            Side::Buy,
            Decimal::ZERO,
            dec!(1),
            &filters(),
            &top(),
            &guard(),
            GuardContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FilterReject::NonPositiveInput { .. }));
    }
}
