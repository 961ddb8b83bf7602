//! Delta-driven shadow balance ledger.
//!
//! The single source of truth for position and cash between venue
//! reconciliations. Balance moves are derived purely from numeric
//! increments of `cum_qty`/`cum_quote` per order — never from status
//! strings — which makes duplicate and out-of-order reports harmless by
//! construction. Owned by one worker; readers see atomic snapshots
//! through a `BalanceHandle`.

use super::events::{content_hash, BalanceSnapshot, ExecutionEvent};
use crate::config::LedgerConfig;
use crate::core::{ExecReport, InventoryState, Side};
use parking_lot::RwLock;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Asset selector for availability queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Base,
    Quote,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("negative delta for order {order_id}: qty {qty_delta}, quote {quote_delta}")]
    NegativeDelta { order_id: u64, qty_delta: Decimal, quote_delta: Decimal },
}

/// How an execution report landed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOutcome {
    /// Balances moved by the given deltas.
    Applied { qty_delta: Decimal, quote_delta: Decimal },
    /// `update_id` was not newer than the last seen; ignored.
    Duplicate,
    /// Newer `update_id` but no traded increment; only the cursor moved.
    NoFill,
}

/// Per-order cumulative cursor.
#[derive(Debug, Clone)]
struct ExecRecord {
    cum_qty: Decimal,
    cum_quote: Decimal,
    update_id: u64,
    side: Side,
}

/// Counters, exposed through `stats()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerStats {
    pub updates: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub zero_delta: u64,
    pub negative_delta: u64,
    pub feasibility_rejects: u64,
}

/// Read handle publishing the latest snapshot. Readers never block the
/// ledger worker: they clone an `Arc` under a short read lock.
#[derive(Clone)]
pub struct BalanceHandle(Arc<RwLock<Arc<BalanceSnapshot>>>);

impl BalanceHandle {
    pub fn get(&self) -> Arc<BalanceSnapshot> {
        self.0.read().clone()
    }
}

pub struct ShadowLedger {
    config: LedgerConfig,
    base: Decimal,
    quote: Decimal,
    records: HashMap<u64, ExecRecord>,
    events: VecDeque<ExecutionEvent>,
    seq: u64,
    event_count: u64,
    stats: LedgerStats,
    published: Arc<RwLock<Arc<BalanceSnapshot>>>,
}

impl ShadowLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            base: Decimal::ZERO,
            quote: Decimal::ZERO,
            records: HashMap::new(),
            events: VecDeque::new(),
            seq: 0,
            event_count: 0,
            stats: LedgerStats::default(),
            published: Arc::new(RwLock::new(Arc::new(BalanceSnapshot::empty()))),
        }
    }

    /// Seed balances at startup, before any event has been applied.
    pub fn set_initial_balances(&mut self, base: Decimal, quote: Decimal, now_ns: u64) {
        self.base = base;
        self.quote = quote;
        self.publish(now_ns);
        info!(%base, %quote, "ledger seeded");
    }

    pub fn handle(&self) -> BalanceHandle {
        BalanceHandle(self.published.clone())
    }

    /// Apply one normalized execution report.
    pub fn apply(&mut self, report: &ExecReport, now_ns: u64) -> Result<ApplyOutcome, LedgerError> {
        self.stats.updates += 1;

        let record = self.records.entry(report.order_id).or_insert_with(|| ExecRecord {
            cum_qty: Decimal::ZERO,
            cum_quote: Decimal::ZERO,
            update_id: 0,
            side: report.side,
        });

        if record.update_id >= report.update_id && report.update_id != 0 {
            self.stats.duplicates += 1;
            debug!(order_id = report.order_id, update_id = report.update_id, "duplicate report");
            return Ok(ApplyOutcome::Duplicate);
        }

        let qty_delta = report.cum_qty - record.cum_qty;
        let quote_delta = report.cum_quote - record.cum_quote;

        if qty_delta < Decimal::ZERO || quote_delta < Decimal::ZERO {
            self.stats.negative_delta += 1;
            error!(
                order_id = report.order_id,
                %qty_delta,
                %quote_delta,
                "negative delta rejected"
            );
            return Err(LedgerError::NegativeDelta {
                order_id: report.order_id,
                qty_delta,
                quote_delta,
            });
        }

        record.update_id = report.update_id;

        let outcome = if qty_delta.is_zero() {
            self.stats.zero_delta += 1;
            ApplyOutcome::NoFill
        } else {
            record.cum_qty = report.cum_qty;
            record.cum_quote = report.cum_quote;
            match record.side {
                Side::Buy => {
                    self.base += qty_delta;
                    self.quote -= quote_delta;
                }
                Side::Sell => {
                    self.base -= qty_delta;
                    self.quote += quote_delta;
                }
            }
            self.stats.applied += 1;
            ApplyOutcome::Applied { qty_delta, quote_delta }
        };

        self.append_event(report, now_ns);
        self.publish(now_ns);
        Ok(outcome)
    }

    fn append_event(&mut self, report: &ExecReport, now_ns: u64) {
        self.seq += 1;
        self.event_count += 1;
        if self.events.len() == self.config.max_events_in_memory {
            self.events.pop_front();
        }
        self.events.push_back(ExecutionEvent {
            seq: self.seq,
            report: report.clone(),
            hash: content_hash(report),
            applied_ts_ns: now_ns,
        });
    }

    fn publish(&self, now_ns: u64) {
        *self.published.write() = Arc::new(BalanceSnapshot {
            seq: self.seq,
            base: self.base,
            quote: self.quote,
            event_count: self.event_count,
            ts_ns: now_ns,
        });
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        *self.published.read().as_ref()
    }

    /// Balance usable for new orders, net of the reserve.
    pub fn available(&self, asset: Asset) -> Decimal {
        let real = match asset {
            Asset::Base => self.base,
            Asset::Quote => self.quote,
        };
        let reserve =
            Decimal::from_f64(self.config.reserve_ratio).unwrap_or(Decimal::ZERO);
        (real * (Decimal::ONE - reserve)).max(Decimal::ZERO)
    }

    /// Pre-trade feasibility with an extra safety margin on top of the
    /// reserve.
    pub fn check_order_feasible(&mut self, side: Side, qty: Decimal, price: Decimal) -> bool {
        let (required, available) = match side {
            Side::Buy => (qty * price, self.available(Asset::Quote)),
            Side::Sell => (qty, self.available(Asset::Base)),
        };
        let feasible = required <= available * Decimal::new(98, 2);
        if !feasible {
            self.stats.feasibility_rejects += 1;
            debug!(%required, %available, side = %side, "order not feasible");
        }
        feasible
    }

    /// Force balances to venue truth. Reconciler-only.
    pub(crate) fn force_set(&mut self, base: Decimal, quote: Decimal, now_ns: u64) {
        self.base = base;
        self.quote = quote;
        self.publish(now_ns);
    }

    pub fn balances(&self) -> (Decimal, Decimal) {
        (self.base, self.quote)
    }

    /// Inventory projected at a mid price.
    pub fn inventory_at(&self, mid: Decimal, target_weight: f64) -> InventoryState {
        let base_value = self.base * mid;
        let total = base_value + self.quote;
        let base_weight = if total > Decimal::ZERO {
            (base_value / total).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        InventoryState {
            base_qty: self.base,
            quote_qty: self.quote,
            base_weight,
            imbalance: (base_weight - target_weight).abs(),
            target_weight,
        }
    }

    /// Rebuild balances by replaying retained events on top of the given
    /// starting balances. Duplicate update ids within the replayed range
    /// apply once, exactly as in live processing.
    pub fn replay(&self, from_seq: u64, base0: Decimal, quote0: Decimal) -> BalanceSnapshot {
        let mut base = base0;
        let mut quote = quote0;
        let mut cursors: HashMap<u64, (Decimal, Decimal, u64)> = HashMap::new();
        let mut last_seq = 0;
        let mut count = 0;

        for event in self.events.iter().filter(|e| e.seq >= from_seq) {
            let r = &event.report;
            let cursor = cursors.entry(r.order_id).or_insert((Decimal::ZERO, Decimal::ZERO, 0));
            if cursor.2 >= r.update_id && r.update_id != 0 {
                continue;
            }
            let qty_delta = r.cum_qty - cursor.0;
            let quote_delta = r.cum_quote - cursor.1;
            cursor.2 = r.update_id;
            if qty_delta <= Decimal::ZERO {
                continue;
            }
            cursor.0 = r.cum_qty;
            cursor.1 = r.cum_quote;
            match r.side {
                Side::Buy => {
                    base += qty_delta;
                    quote -= quote_delta;
                }
                Side::Sell => {
                    base -= qty_delta;
                    quote += quote_delta;
                }
            }
            last_seq = event.seq;
            count += 1;
        }

        BalanceSnapshot { seq: last_seq, base, quote, event_count: count, ts_ns: 0 }
    }

    pub fn events(&self) -> impl Iterator<Item = &ExecutionEvent> {
        self.events.iter()
    }

    pub fn stats(&self) -> LedgerStats {
        self.stats
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrderStatus;
    use rust_decimal_macros::dec;

    fn config() -> LedgerConfig {
        LedgerConfig {
            reserve_ratio: 0.02,
            reconcile_interval_s: 30,
            deviation_threshold_pct: 0.1,
            max_events_in_memory: 100,
        }
    }

    fn report(
        order_id: u64,
        side: Side,
        cum_qty: Decimal,
        cum_quote: Decimal,
        update_id: u64,
    ) -> ExecReport {
        let last_qty = cum_qty; // unused by the delta path
        ExecReport {
            order_id,
            client_order_id: format!("c-{order_id}"),
            symbol: "DOGEUSDT".into(),
            side,
            status: OrderStatus::PartiallyFilled,
            status_raw: "PARTIALLY_FILLED".into(),
            last_qty,
            cum_qty,
            last_quote: cum_quote,
            cum_quote,
            price: dec!(0.26395),
            is_maker: true,
            ts_ns: update_id * 1_000,
            update_id,
        }
    }

    #[test]
    fn buy_fill_moves_base_up_quote_down() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(0), dec!(1000), 0);

        l.apply(&report(1, Side::Buy, dec!(20), dec!(5.279), 1), 1).unwrap();
        l.apply(&report(1, Side::Buy, dec!(50), dec!(13.198), 2), 2).unwrap();

        let (base, quote) = l.balances();
        assert_eq!(base, dec!(50));
        assert_eq!(quote, dec!(1000) - dec!(13.198));
    }

    #[test]
    fn duplicate_update_id_applies_once() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(0), dec!(1000), 0);

        let r = report(1, Side::Buy, dec!(20), dec!(5.279), 7);
        assert!(matches!(l.apply(&r, 1).unwrap(), ApplyOutcome::Applied { .. }));
        assert_eq!(l.apply(&r, 2).unwrap(), ApplyOutcome::Duplicate);

        let (base, _) = l.balances();
        assert_eq!(base, dec!(20));
        assert_eq!(l.stats().duplicates, 1);
    }

    #[test]
    fn negative_delta_is_rejected_without_balance_effect() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(0), dec!(1000), 0);

        l.apply(&report(1, Side::Buy, dec!(50), dec!(13.198), 1), 1).unwrap();
        let err = l.apply(&report(1, Side::Buy, dec!(40), dec!(10), 2), 2).unwrap_err();
        assert!(matches!(err, LedgerError::NegativeDelta { .. }));

        let (base, quote) = l.balances();
        assert_eq!(base, dec!(50));
        assert_eq!(quote, dec!(1000) - dec!(13.198));
        assert_eq!(l.stats().negative_delta, 1);
    }

    #[test]
    fn zero_delta_advances_cursor_only() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(100), dec!(1000), 0);

        // Cancel confirmation after a fill: same cumulative values.
        l.apply(&report(1, Side::Sell, dec!(10), dec!(2.64), 1), 1).unwrap();
        let out = l.apply(&report(1, Side::Sell, dec!(10), dec!(2.64), 2), 2).unwrap();
        assert_eq!(out, ApplyOutcome::NoFill);

        let (base, _) = l.balances();
        assert_eq!(base, dec!(90));
        // A later replayed duplicate of update 2 is now recognized.
        assert_eq!(
            l.apply(&report(1, Side::Sell, dec!(10), dec!(2.64), 2), 3).unwrap(),
            ApplyOutcome::Duplicate
        );
    }

    #[test]
    fn available_balance_applies_reserve() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(100), dec!(1000), 0);
        assert_eq!(l.available(Asset::Quote), dec!(980.0));
        assert_eq!(l.available(Asset::Base), dec!(98.0));
    }

    #[test]
    fn feasibility_uses_available_with_margin() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(0), dec!(100), 0);
        // 98 available * 0.98 margin = 96.04 spendable.
        assert!(l.check_order_feasible(Side::Buy, dec!(90), dec!(1)));
        assert!(!l.check_order_feasible(Side::Buy, dec!(97), dec!(1)));
        assert_eq!(l.stats().feasibility_rejects, 1);
    }

    #[test]
    fn handle_sees_published_snapshots() {
        let mut l = ShadowLedger::new(config());
        let handle = l.handle();
        l.set_initial_balances(dec!(0), dec!(1000), 5);
        l.apply(&report(1, Side::Buy, dec!(50), dec!(13.198), 1), 10).unwrap();

        let snap = handle.get();
        assert_eq!(snap.base, dec!(50));
        assert_eq!(snap.seq, 1);
        assert_eq!(snap.ts_ns, 10);
    }

    #[test]
    fn replay_reproduces_balances_with_duplicates() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(0), dec!(1000), 0);

        l.apply(&report(1, Side::Buy, dec!(20), dec!(5.279), 1), 1).unwrap();
        let dup = report(1, Side::Buy, dec!(20), dec!(5.279), 1);
        let _ = l.apply(&dup, 2); // duplicate, not applied and not appended twice
        l.apply(&report(1, Side::Buy, dec!(50), dec!(13.198), 2), 3).unwrap();
        l.apply(&report(2, Side::Sell, dec!(10), dec!(2.7), 1), 4).unwrap();

        let replayed = l.replay(1, dec!(0), dec!(1000));
        let (base, quote) = l.balances();
        assert_eq!(replayed.base, base);
        assert_eq!(replayed.quote, quote);
    }

    #[test]
    fn inventory_weights_sum_to_one() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(1000), dec!(264), 0);
        let inv = l.inventory_at(dec!(0.264), 0.5);
        let quote_weight = 1.0 - inv.base_weight;
        assert!((inv.base_weight + quote_weight - 1.0).abs() < 1e-12);
        assert!((inv.base_weight - 0.5).abs() < 1e-9);
        assert!(inv.imbalance < 1e-9);
    }

    #[test]
    fn event_hashes_are_present_and_unique_per_update() {
        let mut l = ShadowLedger::new(config());
        l.set_initial_balances(dec!(0), dec!(1000), 0);
        l.apply(&report(1, Side::Buy, dec!(20), dec!(5.279), 1), 1).unwrap();
        l.apply(&report(1, Side::Buy, dec!(50), dec!(13.198), 2), 2).unwrap();
        let hashes: Vec<u128> = l.events().map(|e| e.hash).collect();
        assert_eq!(hashes.len(), 2);
        assert_ne!(hashes[0], hashes[1]);
    }
}
