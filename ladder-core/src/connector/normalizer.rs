//! Execution-report normalizer.
//!
//! Venues and gateways disagree about key names, status spellings and which
//! of the quote fields they bother to fill in. Everything inbound funnels
//! through here and comes out as one `ExecReport`; nothing downstream ever
//! sees a raw map again.

use crate::core::{ExecReport, OrderStatus, Side};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unrecognized side: {0:?}")]
    BadSide(String),
    #[error("unrecognized order status: {0:?}")]
    UnknownStatus(String),
}

/// Fold venue status spellings into the canonical set. Unknown strings
/// stay unknown and are rejected by the caller.
fn map_status(raw: &str) -> OrderStatus {
    match raw {
        "NEW" | "PENDING_NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" | "PARTIAL_FILL" | "PARTIALLYFILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Canceled,
        "EXPIRED" => OrderStatus::Expired,
        "REJECTED" => OrderStatus::Rejected,
        "PENDING_CANCEL" => OrderStatus::PendingCancel,
        _ => OrderStatus::Unknown,
    }
}

/// First non-empty value among aliased keys.
fn pick<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| {
        raw.get(*k).filter(|v| {
            !v.is_null() && v.as_str().map_or(true, |s| !s.is_empty())
        })
    })
}

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        // Numbers arrive through their exact textual form to avoid any
        // float round trip on money fields.
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a raw execution-report map into an `ExecReport`.
///
/// Key aliases, first non-empty wins:
/// order id `i|orderId|order_id`, symbol `s|symbol`, side `S|side`,
/// status `X|orderStatus|status`, last qty `l|lastQty`, cum qty `z|cumQty`,
/// last quote `Y|lastQuote`, cum quote `Z|cumQuote`, price `p|L|price`,
/// maker flag `m|is_maker`, timestamp `E|T|ts` (ms), update id
/// `u|update_id`.
pub fn normalize_execution_report(raw: &Map<String, Value>) -> Result<ExecReport, NormalizeError> {
    let order_id = pick(raw, &["i", "orderId", "order_id"])
        .and_then(as_u64)
        .ok_or(NormalizeError::MissingField("order_id"))?;

    let symbol = pick(raw, &["s", "symbol"])
        .and_then(as_string)
        .ok_or(NormalizeError::MissingField("symbol"))?;

    let client_order_id = pick(raw, &["c", "clientOrderId", "client_order_id"])
        .and_then(as_string)
        .unwrap_or_default();

    let side_raw = pick(raw, &["S", "side"])
        .and_then(as_string)
        .ok_or(NormalizeError::MissingField("side"))?;
    let side = Side::parse(&side_raw).ok_or_else(|| NormalizeError::BadSide(side_raw.clone()))?;

    let status_raw = pick(raw, &["X", "orderStatus", "status"])
        .and_then(as_string)
        .map(|s| s.to_ascii_uppercase())
        .ok_or(NormalizeError::MissingField("status"))?;
    let status = map_status(&status_raw);
    if status == OrderStatus::Unknown {
        return Err(NormalizeError::UnknownStatus(status_raw));
    }

    let last_qty = pick(raw, &["l", "lastQty"]).and_then(as_decimal).unwrap_or(Decimal::ZERO);
    let cum_qty = pick(raw, &["z", "cumQty"]).and_then(as_decimal).unwrap_or(Decimal::ZERO);
    let mut last_quote =
        pick(raw, &["Y", "lastQuote"]).and_then(as_decimal).unwrap_or(Decimal::ZERO);
    let cum_quote = pick(raw, &["Z", "cumQuote"]).and_then(as_decimal).unwrap_or(Decimal::ZERO);
    let price = pick(raw, &["p", "L", "price"]).and_then(as_decimal).unwrap_or(Decimal::ZERO);

    // Some gateways omit the per-fill quote amount; reconstruct it.
    if last_quote.is_zero() && last_qty > Decimal::ZERO && price > Decimal::ZERO {
        last_quote = last_qty * price;
        debug!(%last_quote, "backfilled last_quote from last_qty * price");
    }

    let is_maker = pick(raw, &["m", "is_maker"]).and_then(Value::as_bool).unwrap_or(false);
    let ts_ms = pick(raw, &["E", "T", "ts"]).and_then(as_u64).unwrap_or(0);
    let update_id = pick(raw, &["u", "update_id"]).and_then(as_u64).unwrap_or(0);

    Ok(ExecReport {
        order_id,
        client_order_id,
        symbol,
        side,
        status,
        status_raw,
        last_qty,
        cum_qty,
        last_quote,
        cum_quote,
        price,
        is_maker,
        ts_ns: ts_ms.saturating_mul(1_000_000),
        update_id,
    })
}

/// Project an `ExecReport` back into a raw map using the canonical short
/// keys. `normalize_execution_report(to_raw(r)) == r` up to the raw status
/// string, which is emitted in canonical form.
pub fn to_raw(report: &ExecReport) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("i".into(), Value::from(report.order_id));
    m.insert("c".into(), Value::from(report.client_order_id.clone()));
    m.insert("s".into(), Value::from(report.symbol.clone()));
    m.insert("S".into(), Value::from(report.side.as_str()));
    m.insert("X".into(), Value::from(report.status.as_str()));
    m.insert("l".into(), Value::from(report.last_qty.to_string()));
    m.insert("z".into(), Value::from(report.cum_qty.to_string()));
    m.insert("Y".into(), Value::from(report.last_quote.to_string()));
    m.insert("Z".into(), Value::from(report.cum_quote.to_string()));
    m.insert("p".into(), Value::from(report.price.to_string()));
    m.insert("m".into(), Value::from(report.is_maker));
    m.insert("E".into(), Value::from(report.ts_ns / 1_000_000));
    m.insert("u".into(), Value::from(report.update_id));
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw_from(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object literal")
    }

    #[test]
    fn normalizes_binance_style_keys() {
        let raw = raw_from(json!({
            "i": 8921, "s": "DOGEUSDT", "S": "BUY", "X": "PARTIALLY_FILLED",
            "l": "20", "z": "20", "Y": "5.279", "Z": "5.279",
            "p": "0.26395", "m": true, "E": 1700000000123u64, "u": 1
        }));
        let r = normalize_execution_report(&raw).unwrap();
        assert_eq!(r.order_id, 8921);
        assert_eq!(r.side, Side::Buy);
        assert_eq!(r.status, OrderStatus::PartiallyFilled);
        assert_eq!(r.cum_qty, dec!(20));
        assert_eq!(r.ts_ns, 1700000000123u64 * 1_000_000);
    }

    #[test]
    fn normalizes_long_keys_and_partial_fill_alias() {
        let raw = raw_from(json!({
            "orderId": "42", "symbol": "DOGEUSDT", "side": "sell",
            "orderStatus": "PARTIAL_FILL",
            "lastQty": "5", "cumQty": "5", "cumQuote": "1.32",
            "price": "0.264", "ts": 1700000000500u64, "update_id": 7
        }));
        let r = normalize_execution_report(&raw).unwrap();
        assert_eq!(r.order_id, 42);
        assert_eq!(r.side, Side::Sell);
        assert_eq!(r.status, OrderStatus::PartiallyFilled);
        // Omitted lastQuote is reconstructed from qty * price.
        assert_eq!(r.last_quote, dec!(1.32));
    }

    #[test]
    fn pending_new_maps_to_new() {
        let raw = raw_from(json!({
            "i": 1, "s": "DOGEUSDT", "S": "BUY", "X": "PENDING_NEW",
            "u": 1, "E": 1u64
        }));
        let r = normalize_execution_report(&raw).unwrap();
        assert_eq!(r.status, OrderStatus::New);
        assert_eq!(r.status_raw, "PENDING_NEW");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let raw = raw_from(json!({
            "i": 1, "s": "DOGEUSDT", "S": "BUY", "X": "HALTED", "u": 1
        }));
        assert_eq!(
            normalize_execution_report(&raw),
            Err(NormalizeError::UnknownStatus("HALTED".into()))
        );
    }

    #[test]
    fn missing_order_id_is_rejected() {
        let raw = raw_from(json!({ "s": "DOGEUSDT", "S": "BUY", "X": "NEW" }));
        assert_eq!(
            normalize_execution_report(&raw),
            Err(NormalizeError::MissingField("order_id"))
        );
    }

    #[test]
    fn empty_alias_falls_through_to_next_key() {
        let raw = raw_from(json!({
            "i": "", "orderId": 77, "s": "DOGEUSDT", "S": "SELL", "X": "NEW",
            "u": 3, "E": 5u64
        }));
        let r = normalize_execution_report(&raw).unwrap();
        assert_eq!(r.order_id, 77);
    }

    #[test]
    fn round_trip_renormalizes_identically() {
        let raw = raw_from(json!({
            "i": 8921, "c": "B-L0-xyz", "s": "DOGEUSDT", "S": "BUY",
            "X": "FILLED", "l": "30", "z": "50", "Y": "7.919", "Z": "13.198",
            "p": "0.26395", "m": true, "E": 1700000000123u64, "u": 2
        }));
        let first = normalize_execution_report(&raw).unwrap();
        let second = normalize_execution_report(&to_raw(&first)).unwrap();
        assert_eq!(first, second);
    }
}
