//! Immutable execution events and balance snapshots.

use crate::core::ExecReport;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An applied execution report, sequenced and content-addressed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEvent {
    pub seq: u64,
    pub report: ExecReport,
    /// 128-bit content hash over the report's economic fields.
    pub hash: u128,
    pub applied_ts_ns: u64,
}

/// Balance state projected from the event stream at a given sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub seq: u64,
    pub base: Decimal,
    pub quote: Decimal,
    pub event_count: u64,
    pub ts_ns: u64,
}

impl BalanceSnapshot {
    pub fn empty() -> Self {
        Self { seq: 0, base: Decimal::ZERO, quote: Decimal::ZERO, event_count: 0, ts_ns: 0 }
    }
}

/// Content hash binding the fields that drive balance projection. Two
/// reports that would move balances identically hash identically; replay
/// and audit compare these.
pub fn content_hash(report: &ExecReport) -> u128 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&report.order_id.to_le_bytes());
    hasher.update(report.side.as_str().as_bytes());
    hasher.update(report.last_qty.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(report.cum_qty.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(report.last_quote.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(report.cum_quote.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(&report.ts_ns.to_le_bytes());
    hasher.update(&report.update_id.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    u128::from_le_bytes(bytes)
}
