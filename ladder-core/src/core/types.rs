//! Core domain types shared by every component.
//!
//! Prices, quantities and notionals are `rust_decimal::Decimal` everywhere.
//! Floats appear only in scores, pressures and scale factors.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side a fill on `self` requires an adjustment on.
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Parse a venue-formatted side string ("BUY"/"SELL", case-insensitive).
    pub fn parse(s: &str) -> Option<Side> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quoting layer. L0 sits closest to mid and refreshes fastest; L2 sits
/// furthest out with the longest TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    L0,
    L1,
    L2,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::L0, Layer::L1, Layer::L2];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Layer::L0 => 0,
            Layer::L1 => 1,
            Layer::L2 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::L0 => "L0",
            Layer::L1 => "L1",
            Layer::L2 => "L2",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which market-data path produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Live order book, fresh.
    Primary,
    /// Trade-tape VWAP with a synthetic book.
    Secondary,
    /// Last known mid, both paths stale.
    Fallback,
    /// Hard floor constant; un-tradable.
    Emergency,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
            Source::Fallback => "fallback",
            Source::Emergency => "emergency",
        }
    }
}

/// Fused market snapshot. Immutable once published; `mid` is always > 0.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
    pub spread_bps: f64,
    pub ts_ns: u64,
    pub source: Source,
    /// Quality score in [0, 1]; below 0.5 the engine stops quoting.
    pub quality: f64,
    pub is_stale: bool,
}

impl MarketSnapshot {
    /// A snapshot the engine may quote against.
    #[inline]
    pub fn is_tradable(&self) -> bool {
        self.quality >= 0.5 && !self.is_stale && self.source != Source::Emergency
    }
}

/// Top of book as maintained by the primary path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopOfBook {
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
    pub last_update_ns: u64,
}

/// A single trade observation retained for VWAP fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSample {
    pub price: Decimal,
    pub qty: Decimal,
    pub ts_ns: u64,
}

/// Venue-imposed order filters for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_notional: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

impl SymbolFilters {
    /// Permissive filters for tests and the simulated venue.
    pub fn permissive() -> Self {
        use rust_decimal_macros::dec;
        Self {
            tick_size: dec!(0.00001),
            step_size: dec!(1),
            min_qty: dec!(1),
            max_qty: dec!(1000000),
            min_notional: dec!(1),
            min_price: dec!(0.000001),
            max_price: dec!(1000000),
        }
    }
}

/// Position and cash view projected by the ledger at the current mid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InventoryState {
    pub base_qty: Decimal,
    pub quote_qty: Decimal,
    /// Value share of the base asset in [0, 1].
    pub base_weight: f64,
    /// |base_weight - target_weight|.
    pub imbalance: f64,
    pub target_weight: f64,
}

impl InventoryState {
    pub fn flat(target_weight: f64) -> Self {
        Self {
            base_qty: Decimal::ZERO,
            quote_qty: Decimal::ZERO,
            base_weight: 0.0,
            imbalance: target_weight,
            target_weight,
        }
    }

    /// Signed inventory error `target - current`; positive means the book
    /// is short of base.
    #[inline]
    pub fn error(&self) -> f64 {
        self.target_weight - self.base_weight
    }
}

/// Message budgets for one 10-second window, produced by the governor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budgets {
    pub fill_10s: u32,
    pub reprice_10s: u32,
    pub cancel_10s: u32,
    pub burst_fill: u32,
    pub burst_reprice: u32,
    pub burst_cancel: u32,
    pub ttl_scale: f64,
    pub fill_10s_buy: u32,
    pub fill_10s_sell: u32,
    /// Buy share of the fill budget, clamped to [0.35, 0.65].
    pub alpha: f64,
}

impl Budgets {
    /// Conservative fallback used before the governor has observed anything.
    pub fn baseline() -> Self {
        Self {
            fill_10s: 6,
            reprice_10s: 6,
            cancel_10s: 40,
            burst_fill: 6,
            burst_reprice: 6,
            burst_cancel: 40,
            ttl_scale: 1.0,
            fill_10s_buy: 3,
            fill_10s_sell: 3,
            alpha: 0.5,
        }
    }

    pub fn side_fill_budget(&self, side: Side) -> u32 {
        match side {
            Side::Buy => self.fill_10s_buy,
            Side::Sell => self.fill_10s_sell,
        }
    }
}

/// Message bucket the rate control plane accounts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// New resting orders.
    Fill,
    /// Cancel-replace operations.
    Reprice,
    /// Cancels.
    Cancel,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Fill, Bucket::Reprice, Bucket::Cancel];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Fill => "fill",
            Bucket::Reprice => "reprice",
            Bucket::Cancel => "cancel",
        }
    }
}
