//! Shared harness for the engine integration tests.

use ladder_core::config::{default_profile, EngineConfig};
use ladder_core::connector::{MarketDepthUpdate, MarketEvent, VenueBalances};
use ladder_core::testing::SimConnector;
use ladder_core::{SymbolFilters, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub fn test_config(startup_delay_s: u64) -> EngineConfig {
    let mut cfg = default_profile("DOGEUSDT", dec!(1000));
    cfg.startup_delay_s = startup_delay_s;
    cfg
}

pub fn seeded_connector(base: Decimal, quote: Decimal) -> Arc<SimConnector> {
    let connector = Arc::new(SimConnector::new(SymbolFilters::permissive()));
    connector.set_book(dec!(0.26398), dec!(0.26402));
    connector.set_balances(VenueBalances {
        base_free: base,
        base_locked: dec!(0),
        quote_free: quote,
        quote_locked: dec!(0),
    });
    connector
}

pub fn depth_event(update_id: u64) -> MarketEvent {
    MarketEvent::Depth(MarketDepthUpdate {
        bids: vec![(dec!(0.26398), dec!(1200))],
        asks: vec![(dec!(0.26402), dec!(1100))],
        ts_exch_ms: 1_700_000_000_000 + update_id,
        last_update_id: update_id,
    })
}

/// Venue order id a recorded submit call was acknowledged with: ids are
/// handed out sequentially across submits and cancel-replaces.
pub fn order_id_of_submit(connector: &SimConnector, side: Side) -> Option<(u64, Decimal)> {
    use ladder_core::testing::SimCall;
    let mut next_id = 1u64;
    for call in connector.calls() {
        match call {
            SimCall::Submit(req) => {
                if req.side == side {
                    return Some((next_id, req.qty));
                }
                next_id += 1;
            }
            SimCall::CancelReplace(_) => next_id += 1,
            _ => {}
        }
    }
    None
}
