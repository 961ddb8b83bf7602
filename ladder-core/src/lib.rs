//! Ladder Core - Single-Symbol Passive Market-Making Engine
//!
//! The decision-and-execution core of an automated maker for one spot
//! pair: layered two-sided quoting, delta-driven shadow balances, and a
//! PID-governed message budget, driven by three event sources (market
//! tick, own fill, timer).
//!
//! ## Architecture
//! - **Dual-path market data**: order-book primary, trade-tape VWAP
//!   backup, last-known-mid fallback; the published mid is never zero
//! - **Shadow-balance ledger**: append-only execution events, balances
//!   derived purely from cumulative deltas, reconciled against the venue
//! - **Rate control plane**: closed-queue-model budgets, PID usage
//!   governor, token-bucket admission, venue weight fuse
//! - **Maker-guard**: every outbound price quantized away from mid and
//!   clear of the touch, so post-only orders cannot cross
//! - **Sub-50ms cross response**: fills trigger a precomputed
//!   opposite-side adjustment through an expedited critical path
//!
//! ## Core Modules
//! - `core`: domain types (sides, layers, snapshots, orders, budgets)
//! - `config`: typed settings and named profiles
//! - `connector`: the venue seam and the execution-report normalizer
//! - `data`: dual-path market data fusion
//! - `risk`: quantizer, rate gate, budget governor and allocator
//! - `ledger`: shadow balances, event stream, reconciliation
//! - `exec`: priority queue, batch executor, cross response
//! - `engine`: orchestrator, lifecycle state machine, quoting trait
//! - `resilience`: kill switch, backoff
//! - `monitoring`: prometheus metrics and scrape endpoint

pub mod config;
pub mod connector;
pub mod core;
pub mod data;
pub mod engine;
pub mod exec;
pub mod ledger;
pub mod monitoring;
pub mod resilience;
pub mod risk;
pub mod testing;
pub mod utils;

// Re-export the types nearly every consumer touches.
pub use crate::core::{
    Bucket, Budgets, ExecReport, InventoryState, Layer, LiveOrder, MarketSnapshot, OrderStatus,
    PlannedOrder, Side, Source, SymbolFilters,
};
pub use config::EngineConfig;
pub use engine::{ConcurrencyTargets, Engine, EngineChannels, EnginePhase, QuoteInputs, Quoter};
pub use resilience::KillSwitch;

// Re-export error types
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{default_profile, EngineConfig};
    pub use crate::connector::{Connector, MarketEvent};
    pub use crate::core::{
        Budgets, InventoryState, Layer, MarketSnapshot, PlannedOrder, Side, SymbolFilters,
    };
    pub use crate::engine::{ConcurrencyTargets, Engine, EnginePhase, QuoteInputs, Quoter};
    pub use crate::resilience::KillSwitch;
    pub use crate::{Error, Result};
}
