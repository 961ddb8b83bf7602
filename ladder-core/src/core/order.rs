//! Order-shaped types: normalized execution reports, planned orders and the
//! executor-owned live order table entries.

use super::types::{Layer, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized order status. Venue aliases are folded by the event
/// normalizer; anything unrecognized becomes `Unknown` and is rejected
/// before it can touch the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
    PendingCancel,
    Unknown,
}

impl OrderStatus {
    /// True when the order can no longer trade.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized execution report. `update_id` is monotone per order and is
/// the sole idempotency key the ledger relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecReport {
    pub order_id: u64,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    /// Raw venue status string, retained for audit.
    pub status_raw: String,
    pub last_qty: Decimal,
    pub cum_qty: Decimal,
    pub last_quote: Decimal,
    pub cum_quote: Decimal,
    pub price: Decimal,
    pub is_maker: bool,
    pub ts_ns: u64,
    pub update_id: u64,
}

impl ExecReport {
    /// Whether this report carries a trade (as opposed to a pure
    /// state transition such as an ack or a cancel confirmation).
    #[inline]
    pub fn has_fill(&self) -> bool {
        self.last_qty > Decimal::ZERO
    }
}

/// An order the planner intends to place. No persistent identity; the
/// executor turns it into a `LiveOrder` on venue ack.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub side: Side,
    pub price: Decimal,
    pub qty: Decimal,
    pub layer: Layer,
    pub ttl_ms: u64,
    pub client_order_id: String,
    pub post_only: bool,
}

impl PlannedOrder {
    #[inline]
    pub fn notional(&self) -> Decimal {
        self.price * self.qty
    }
}

/// Executor-side order state. Distinct from `OrderStatus`: it tracks what
/// the executor knows, including the window where an outbound call timed
/// out and the true state is unknown until reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveState {
    Submitted,
    Acked,
    PendingCancel,
    /// Outbound call timed out; notional stays reserved until a
    /// reconciliation probe resolves it.
    InflightUnknown,
}

/// A resting order owned by the batch executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveOrder {
    pub order_id: u64,
    pub client_order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub qty_open: Decimal,
    pub layer: Layer,
    pub created_ts_ns: u64,
    pub ttl_ms: u64,
    pub state: LiveState,
}

impl LiveOrder {
    /// TTL expiry check against a monotone nanosecond clock.
    #[inline]
    pub fn is_expired(&self, now_ns: u64) -> bool {
        now_ns.saturating_sub(self.created_ts_ns) > self.ttl_ms.saturating_mul(1_000_000)
    }

    #[inline]
    pub fn reserved_notional(&self) -> Decimal {
        self.price * self.qty_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn live(created_ns: u64, ttl_ms: u64) -> LiveOrder {
        LiveOrder {
            order_id: 1,
            client_order_id: "c-1".into(),
            side: Side::Buy,
            price: dec!(0.26395),
            qty_open: dec!(50),
            layer: Layer::L0,
            created_ts_ns: created_ns,
            ttl_ms,
            state: LiveState::Acked,
        }
    }

    #[test]
    fn ttl_expiry_boundary() {
        let o = live(1_000_000_000, 2_000);
        // Exactly at TTL: not yet expired.
        assert!(!o.is_expired(1_000_000_000 + 2_000 * 1_000_000));
        assert!(o.is_expired(1_000_000_000 + 2_000 * 1_000_000 + 1));
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(!OrderStatus::PendingCancel.is_terminal());
    }

    #[test]
    fn planned_notional() {
        let p = PlannedOrder {
            side: Side::Sell,
            price: dec!(0.26410),
            qty: dec!(40),
            layer: Layer::L1,
            ttl_ms: 8_000,
            client_order_id: "c-2".into(),
            post_only: true,
        };
        assert_eq!(p.notional(), dec!(10.564));
    }
}
