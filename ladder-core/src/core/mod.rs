//! Domain model: sides, layers, snapshots, orders, filters and budgets.

pub mod order;
pub mod types;

pub use order::{ExecReport, LiveOrder, LiveState, OrderStatus, PlannedOrder};
pub use types::{
    Bucket, Budgets, InventoryState, Layer, MarketSnapshot, Side, Source, SymbolFilters,
    TopOfBook, TradeSample,
};
