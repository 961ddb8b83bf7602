//! The quoting seam.
//!
//! The engine is generic over a `Quoter`; the concrete pipeline lives in
//! the quoting crate and is wired in at the binary. Everything a quoter
//! sees arrives by value or shared reference — no back-pointers into the
//! engine.

use crate::core::{
    Budgets, InventoryState, Layer, MarketSnapshot, PlannedOrder, Side, SymbolFilters, TopOfBook,
};
use crate::risk::GuardContext;
use rust_decimal::Decimal;

/// Per-layer concurrency targets the governor sizes budgets from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcurrencyTargets {
    pub n_l0: u32,
    pub n_l1: u32,
    pub n_l2: u32,
    pub ttl_l0_s: f64,
    pub ttl_l1_s: f64,
    pub ttl_l2_s: f64,
}

impl ConcurrencyTargets {
    pub fn total(&self) -> u32 {
        self.n_l0 + self.n_l1 + self.n_l2
    }
}

/// Inputs to one planning pass.
#[derive(Debug, Clone)]
pub struct QuoteInputs<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub inventory: &'a InventoryState,
    pub budgets: &'a Budgets,
    pub filters: &'a SymbolFilters,
    pub top: Option<TopOfBook>,
    /// Spendable balances, net of the ledger reserve.
    pub free_base: Decimal,
    pub free_quote: Decimal,
    /// Degraded mode: widen, shrink, and drop the outer layers.
    pub degraded: bool,
}

/// The decision pipeline: observes market flow, emits ladders.
pub trait Quoter: Send + 'static {
    /// Observe a fused snapshot. Called on every tick before planning.
    fn observe_tick(&mut self, snapshot: &MarketSnapshot);

    /// Observe a trade print.
    fn observe_trade(&mut self, price: Decimal, qty: Decimal, ts_ns: u64);

    /// Observe top-of-book depth quantities.
    fn observe_depth(&mut self, bid_qty: Decimal, ask_qty: Decimal);

    /// A venue filter or post-only reject on this (side, layer). The
    /// quoter should avoid the combination for a while.
    fn on_filter_reject(&mut self, side: Side, layer: Layer);

    /// Produce the intended ladder for the current state.
    fn plan(&mut self, inputs: &QuoteInputs<'_>) -> Vec<PlannedOrder>;

    /// Current slot targets and TTLs for the governor.
    fn concurrency_targets(&self) -> ConcurrencyTargets;

    /// Vol/imbalance context for the maker guard.
    fn guard_context(&self) -> GuardContext;

    fn name(&self) -> &'static str;
}
