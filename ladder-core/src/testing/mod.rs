//! Test doubles and helpers shared by unit tests, integration tests and
//! the demo binary.

pub mod sim_connector;

pub use sim_connector::{SimCall, SimConnector};

use crate::core::Side;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

/// Build a raw venue execution-report map the way the user-data stream
/// would deliver it.
#[allow(clippy::too_many_arguments)]
pub fn raw_report(
    order_id: u64,
    side: Side,
    status: &str,
    last_qty: Decimal,
    cum_qty: Decimal,
    cum_quote: Decimal,
    price: Decimal,
    update_id: u64,
) -> Map<String, Value> {
    json!({
        "i": order_id,
        "s": "DOGEUSDT",
        "S": side.as_str(),
        "X": status,
        "l": last_qty.to_string(),
        "z": cum_qty.to_string(),
        "Z": cum_quote.to_string(),
        "p": price.to_string(),
        "m": true,
        "E": 1_700_000_000_000u64 + update_id,
        "u": update_id,
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}
