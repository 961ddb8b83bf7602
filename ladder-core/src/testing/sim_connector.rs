//! Deterministic simulated connector.
//!
//! Backs the integration tests and the demo binary. Every call is
//! recorded; failures are injected per-call from a script queue; the
//! post-only check is enforced against a settable book so maker-guard
//! violations surface exactly as the venue would surface them.

use crate::connector::{
    CancelAck, CancelReplaceRequest, CancelRequest, Connector, ConnectorError, SubmitAck,
    SubmitRequest, VenueBalances,
};
use crate::core::{Side, SymbolFilters};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    Submit(SubmitRequest),
    Cancel(CancelRequest),
    CancelReplace(CancelReplaceRequest),
    Filters(String),
    Balances,
}

#[derive(Default)]
struct SimState {
    calls: Vec<SimCall>,
    submit_failures: VecDeque<ConnectorError>,
    cancel_failures: VecDeque<ConnectorError>,
    book: Option<(Decimal, Decimal)>,
    balances: Option<VenueBalances>,
}

pub struct SimConnector {
    state: Mutex<SimState>,
    filters: SymbolFilters,
    next_order_id: AtomicU64,
    latency: Duration,
}

impl SimConnector {
    pub fn new(filters: SymbolFilters) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            filters,
            next_order_id: AtomicU64::new(1),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(filters: SymbolFilters, latency: Duration) -> Self {
        Self { latency, ..Self::new(filters) }
    }

    /// Best bid/ask the post-only check runs against.
    pub fn set_book(&self, bid: Decimal, ask: Decimal) {
        self.state.lock().book = Some((bid, ask));
    }

    pub fn set_balances(&self, balances: VenueBalances) {
        self.state.lock().balances = Some(balances);
    }

    /// Script the next submit to fail with `err`.
    pub fn fail_next_submit(&self, err: ConnectorError) {
        self.state.lock().submit_failures.push_back(err);
    }

    pub fn fail_next_cancel(&self, err: ConnectorError) {
        self.state.lock().cancel_failures.push_back(err);
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SimCall::Submit(_) | SimCall::CancelReplace(_)))
            .count()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().calls.iter().filter(|c| matches!(c, SimCall::Cancel(_))).count()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_post_only(state: &SimState, req: &SubmitRequest) -> Result<(), ConnectorError> {
        if !req.post_only {
            return Ok(());
        }
        let Some((bid, ask)) = state.book else {
            return Ok(());
        };
        let crosses = match req.side {
            Side::Buy => req.price >= ask,
            Side::Sell => req.price <= bid,
        };
        if crosses {
            return Err(ConnectorError::WouldMatch);
        }
        Ok(())
    }
}

impl Connector for SimConnector {
    async fn submit(&self, req: SubmitRequest) -> Result<SubmitAck, ConnectorError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.calls.push(SimCall::Submit(req.clone()));
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        Self::check_post_only(&state, &req)?;
        // Ids are handed out under the call-log lock so the recorded call
        // order matches the id sequence even under concurrent submits.
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        Ok(SubmitAck { order_id, client_order_id: req.client_order_id })
    }

    async fn cancel(&self, req: CancelRequest) -> Result<CancelAck, ConnectorError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let order_id = req.order_id.unwrap_or(0);
        state.calls.push(SimCall::Cancel(req));
        if let Some(err) = state.cancel_failures.pop_front() {
            return Err(err);
        }
        Ok(CancelAck { order_id })
    }

    async fn cancel_replace(&self, req: CancelReplaceRequest) -> Result<SubmitAck, ConnectorError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.calls.push(SimCall::CancelReplace(req.clone()));
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        Self::check_post_only(&state, &req.new)?;
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        Ok(SubmitAck { order_id, client_order_id: req.new.client_order_id })
    }

    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ConnectorError> {
        self.state.lock().calls.push(SimCall::Filters(symbol.to_string()));
        Ok(self.filters.clone())
    }

    async fn balances(&self) -> Result<VenueBalances, ConnectorError> {
        self.simulate_latency().await;
        let state = self.state.lock();
        state.balances.ok_or(ConnectorError::Transient {
            status: 503,
            message: "balances not seeded".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{OrderType, TimeInForce};
    use rust_decimal_macros::dec;

    fn submit(side: Side, price: Decimal) -> SubmitRequest {
        SubmitRequest {
            symbol: "DOGEUSDT".into(),
            client_order_id: "c-1".into(),
            side,
            order_type: OrderType::LimitMaker,
            time_in_force: TimeInForce::Gtc,
            price,
            qty: dec!(10),
            post_only: true,
        }
    }

    #[tokio::test]
    async fn acks_with_increasing_order_ids() {
        let sim = SimConnector::new(SymbolFilters::permissive());
        let a = sim.submit(submit(Side::Buy, dec!(0.26390))).await.unwrap();
        let b = sim.submit(submit(Side::Buy, dec!(0.26391))).await.unwrap();
        assert!(b.order_id > a.order_id);
        assert_eq!(sim.submit_count(), 2);
    }

    #[tokio::test]
    async fn post_only_cross_is_rejected() {
        let sim = SimConnector::new(SymbolFilters::permissive());
        sim.set_book(dec!(0.26398), dec!(0.26402));
        let err = sim.submit(submit(Side::Buy, dec!(0.26402))).await.unwrap_err();
        assert_eq!(err, ConnectorError::WouldMatch);
        // Resting below the ask is fine.
        assert!(sim.submit(submit(Side::Buy, dec!(0.26396))).await.is_ok());
    }

    #[tokio::test]
    async fn scripted_failures_fire_once() {
        let sim = SimConnector::new(SymbolFilters::permissive());
        sim.fail_next_submit(ConnectorError::FilterReject { reason: "MIN_NOTIONAL".into() });
        assert!(sim.submit(submit(Side::Sell, dec!(0.27))).await.is_err());
        assert!(sim.submit(submit(Side::Sell, dec!(0.27))).await.is_ok());
    }
}
